// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A complete flash sale in one process: stage 3 units, let 10 buyers race,
//! and watch exactly 3 get through.

use std::{collections::HashMap, convert::Infallible, sync::Arc};

use turnstile::{Admission, FlashSale, Order, SystemOfRecord};
use turnstile_store::MemoryStore;

/// A toy system of record; a real deployment would put SQL behind this.
#[derive(Clone, Default)]
struct Records {
    inner: Arc<parking_lot::Mutex<(HashMap<u64, u32>, Vec<Order>)>>,
}

impl SystemOfRecord for Records {
    type Error = Infallible;

    async fn count_orders(&self, voucher_id: u64, user_id: u64) -> Result<u64, Infallible> {
        let inner = self.inner.lock();
        Ok(inner
            .1
            .iter()
            .filter(|order| order.voucher_id == voucher_id && order.user_id == user_id)
            .count() as u64)
    }

    async fn decrement_stock(&self, voucher_id: u64) -> Result<bool, Infallible> {
        let mut inner = self.inner.lock();
        match inner.0.get_mut(&voucher_id) {
            Some(stock) if *stock > 0 => {
                *stock -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_order(&self, order: &Order) -> Result<bool, Infallible> {
        self.inner.lock().1.push(order.clone());
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> Result<(), turnstile::Error> {
    let records = Records::default();
    records.inner.lock().0.insert(1, 3);

    let sale = Arc::new(FlashSale::builder(MemoryStore::new(), records.clone()).start());
    let now = chrono::Utc::now().timestamp();
    sale.stage_sale(1, 3, now - 1, now + 60).await?;

    let mut buyers = Vec::new();
    for user in 1..=10_u64 {
        let sale = Arc::clone(&sale);
        buyers.push(tokio::spawn(async move { (user, sale.submit(1, user).await) }));
    }

    for buyer in buyers {
        let (user, outcome) = buyer.await.expect("buyer task");
        match outcome? {
            Admission::Admitted { order_id } => println!("user {user}: admitted, order {order_id}"),
            rejection => println!("user {user}: {rejection:?}"),
        }
    }

    Arc::try_unwrap(sale).expect("all buyers joined").shutdown().await;
    println!("persisted orders: {}", records.inner.lock().1.len());
    Ok(())
}

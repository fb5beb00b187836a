// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Redis-backed remote store for the turnstile admission-control engine.
//!
//! [`RedisStore`] implements [`RemoteStore`] and [`SaleStore`] over a
//! multiplexed [`redis::aio::ConnectionManager`]. The operations that must be
//! atomic across a fleet of engine instances run as Lua scripts, so Redis's
//! single-threaded command execution serializes them for free:
//!
//! - `delete_if_equals` compares the stored lock token and deletes the key in
//!   one step, so a holder whose lease lapsed can never delete a lock that
//!   was reacquired by someone else.
//! - `admit` performs the whole flash-sale admission (window check, stock
//!   check, duplicate check, decrement, marker write) in one round trip.
//!
//! # Key layout
//!
//! | purpose             | key                    | shape                           |
//! |---------------------|------------------------|---------------------------------|
//! | sale ticket         | `sale:ticket:<id>`     | hash `{stock, begin, end}`      |
//! | purchase markers    | `sale:buyers:<id>`     | set of user ids                 |
//!
//! Plain key/value entries (cache payloads, locks, sequence counters) use
//! whatever keys the calling component supplies.
//!
//! # Examples
//!
//! ```no_run
//! use turnstile_store::RemoteStore;
//! use turnstile_store_redis::RedisStore;
//!
//! # async fn example() -> Result<(), turnstile_store::Error> {
//! let store = RedisStore::connect("redis://127.0.0.1/").await?;
//! store.put("cache:shop:1", "{\"name\":\"espresso\"}", None).await?;
//! # Ok(())
//! # }
//! ```

use std::{fmt::Debug, sync::Arc, time::Duration};

use redis::{AsyncCommands, Script, aio::ConnectionManager};
use turnstile_store::{AdmitCode, Error, RemoteStore, Result, SaleStore};

/// Deletes KEYS[1] only when its value equals ARGV[1].
const DELETE_IF_EQUALS: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
end
return 0
";

/// The admission script. KEYS[1] is the ticket hash, KEYS[2] the buyer set;
/// ARGV[1] is the user id, ARGV[2] the current epoch second. Replies with the
/// wire encoding of [`AdmitCode`].
const ADMIT: &str = r"
local begin = tonumber(redis.call('hget', KEYS[1], 'begin'))
local finish = tonumber(redis.call('hget', KEYS[1], 'end'))
local now = tonumber(ARGV[2])
if begin == nil or finish == nil or now < begin or now >= finish then
    return 3
end
if tonumber(redis.call('hget', KEYS[1], 'stock')) <= 0 then
    return 1
end
if redis.call('sismember', KEYS[2], ARGV[1]) == 1 then
    return 2
end
redis.call('hincrby', KEYS[1], 'stock', -1)
redis.call('sadd', KEYS[2], ARGV[1])
return 0
";

fn ticket_key(voucher_id: u64) -> String {
    format!("sale:ticket:{voucher_id}")
}

fn buyers_key(voucher_id: u64) -> String {
    format!("sale:buyers:{voucher_id}")
}

/// A remote store backed by a shared Redis server.
///
/// Cloning is cheap: clones share the underlying multiplexed connection,
/// which reconnects automatically on failure. All infrastructure failures
/// surface as [`Error`]s; absence of a key is `Ok(None)`.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    delete_if_equals: Arc<Script>,
    admit: Arc<Script>,
}

impl Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Wraps an existing connection manager.
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            delete_if_equals: Arc::new(Script::new(DELETE_IF_EQUALS)),
            admit: Arc::new(Script::new(ADMIT)),
        }
    }

    /// Connects to the Redis server at `url` (e.g. `redis://127.0.0.1/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or the initial connection
    /// cannot be established.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(Error::from_source)?;
        let conn = ConnectionManager::new(client).await.map_err(Error::from_source)?;
        Ok(Self::new(conn))
    }
}

impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(Error::from_source)
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1));
        }
        let _: () = cmd.query_async(&mut conn).await.map_err(Error::from_source)?;
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1));
        }
        // SET NX replies OK when the key was created and nil when it existed.
        let reply: Option<String> = cmd.query_async(&mut conn).await.map_err(Error::from_source)?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await.map_err(Error::from_source)?;
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .delete_if_equals
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(Error::from_source)?;
        Ok(deleted == 1)
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1_i64).await.map_err(Error::from_source)
    }
}

impl SaleStore for RedisStore {
    async fn stage_sale(&self, voucher_id: u64, stock: u32, begin: i64, end: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(
                ticket_key(voucher_id),
                &[
                    ("stock", i64::from(stock)),
                    ("begin", begin),
                    ("end", end),
                ],
            )
            .ignore()
            .del(buyers_key(voucher_id))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(Error::from_source)?;
        Ok(())
    }

    async fn admit(&self, voucher_id: u64, user_id: u64, now: i64) -> Result<AdmitCode> {
        let mut conn = self.conn.clone();
        let code: i64 = self
            .admit
            .key(ticket_key(voucher_id))
            .key(buyers_key(voucher_id))
            .arg(user_id)
            .arg(now)
            .invoke_async(&mut conn)
            .await
            .map_err(Error::from_source)?;
        AdmitCode::from_wire(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_is_stable() {
        assert_eq!(ticket_key(42), "sale:ticket:42");
        assert_eq!(buyers_key(42), "sale:buyers:42");
    }

    #[test]
    fn admit_script_covers_every_outcome() {
        // The script is the authoritative admission logic; make sure each
        // wire code it can reply with is a defined AdmitCode.
        for line in ADMIT.lines() {
            let line = line.trim();
            if let Some(code) = line.strip_prefix("return ") {
                let code: i64 = code.parse().expect("script returns integer literals");
                AdmitCode::from_wire(code).expect("script replies map to AdmitCode");
            }
        }
    }

    #[test]
    fn admit_script_mutates_only_after_all_checks() {
        let mutation = ADMIT.find("hincrby").expect("script decrements stock");
        for check in ["begin", "stock", "sismember"] {
            let position = ADMIT.find(check).expect("script performs check");
            assert!(position < mutation, "the {check} check must precede the decrement");
        }
    }

    #[test]
    fn delete_if_equals_script_guards_on_value() {
        assert!(DELETE_IF_EQUALS.contains("get"));
        assert!(DELETE_IF_EQUALS.contains("del"));
        assert!(DELETE_IF_EQUALS.contains("ARGV[1]"));
    }
}

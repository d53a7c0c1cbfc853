//! Typed command helpers.
//!
//! Every helper issues exactly one command and converts the reply. Error replies
//! become `KvError::Remote`.

use super::resp::RespValue;
use super::{Connection, EntryType};
use crate::error::{KvError, KvResult};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Values that can be sent as a command argument.
pub trait ToArg {
    fn to_arg(&self) -> Vec<u8>;
}

impl ToArg for str {
    fn to_arg(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Vec<u8> {
        (**self).to_arg()
    }
}

macro_rules! int_arg {
    ($($ty:ty),*) => {
        $(impl ToArg for $ty {
            fn to_arg(&self) -> Vec<u8> {
                self.to_string().into_bytes()
            }
        })*
    };
}

int_arg!(i64, u64, i32, u32, usize, f64);

/// A command name plus its arguments.
#[derive(Debug, Clone)]
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    pub fn new(name: &str) -> Self {
        Self {
            args: vec![name.as_bytes().to_vec()],
        }
    }

    pub fn arg(mut self, value: impl ToArg) -> Self {
        self.args.push(value.to_arg());
        self
    }

    pub fn args<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        self.args.extend(values.into_iter().map(|v| v.to_arg()));
        self
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.args[0]).into_owned()
    }

    pub(crate) fn args_slice(&self) -> &[Vec<u8>] {
        &self.args
    }
}

/// Write condition for scalar sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetCondition {
    #[default]
    Always,
    /// Only write if the key is absent (`NX`).
    NotExists,
    /// Only write if the key is present (`XX`).
    Exists,
}

/// Set algebra operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperation {
    Union,
    Intersect,
    Difference,
}

impl SetOperation {
    fn command(self) -> &'static str {
        match self {
            SetOperation::Union => "SUNION",
            SetOperation::Intersect => "SINTER",
            SetOperation::Difference => "SDIFF",
        }
    }

    fn store_command(self) -> &'static str {
        match self {
            SetOperation::Union => "SUNIONSTORE",
            SetOperation::Intersect => "SINTERSTORE",
            SetOperation::Difference => "SDIFFSTORE",
        }
    }
}

/// Whole milliseconds for `PX`/`PEXPIRE`, at least one.
fn millis(duration: Duration) -> KvResult<i64> {
    i64::try_from(duration.as_millis())
        .map(|ms| ms.max(1))
        .map_err(|_| {
            KvError::invalid_argument(format!(
                "Expiry of {}s is too large",
                duration.as_secs()
            ))
        })
}

fn pairs(flat: Vec<String>) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(flat.len() / 2);
    let mut iter = flat.into_iter();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        out.push((field, value));
    }
    out
}

impl Connection {
    async fn call(&mut self, command: Command) -> KvResult<RespValue> {
        self.execute(&command).await
    }

    pub async fn ping(&mut self) -> KvResult<()> {
        self.call(Command::new("PING")).await?.into_ok()
    }

    // --- keys ---

    pub async fn key_type(&mut self, key: &str) -> KvResult<EntryType> {
        let name = self.call(Command::new("TYPE").arg(key)).await?.into_status()?;
        EntryType::from_type_name(&name)
    }

    pub async fn exists(&mut self, key: &str) -> KvResult<bool> {
        self.call(Command::new("EXISTS").arg(key)).await?.into_bool()
    }

    pub async fn del(&mut self, keys: &[String]) -> KvResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = self.call(Command::new("DEL").args(keys)).await?.into_integer()?;
        Ok(removed as u64)
    }

    /// Returns false when the source key does not exist.
    pub async fn rename(&mut self, from: &str, to: &str) -> KvResult<bool> {
        match self.call(Command::new("RENAME").arg(from).arg(to)).await? {
            RespValue::Error(message) if message.contains("no such key") => Ok(false),
            reply => reply.into_ok().map(|_| true),
        }
    }

    pub async fn pexpire(&mut self, key: &str, ttl: Duration) -> KvResult<bool> {
        self.call(Command::new("PEXPIRE").arg(key).arg(millis(ttl)?))
            .await?
            .into_bool()
    }

    pub async fn pexpire_at(&mut self, key: &str, unix_ms: i64) -> KvResult<bool> {
        self.call(Command::new("PEXPIREAT").arg(key).arg(unix_ms))
            .await?
            .into_bool()
    }

    /// Remaining time to live; `None` for missing keys and keys without expiry.
    pub async fn pttl(&mut self, key: &str) -> KvResult<Option<Duration>> {
        let ms = self.call(Command::new("PTTL").arg(key)).await?.into_integer()?;
        Ok((ms >= 0).then(|| Duration::from_millis(ms as u64)))
    }

    pub async fn scan(
        &mut self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> KvResult<(u64, Vec<String>)> {
        self.call(
            Command::new("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(count),
        )
        .await?
        .into_scan_page()
    }

    pub async fn flushdb(&mut self) -> KvResult<()> {
        self.call(Command::new("FLUSHDB")).await?.into_ok()
    }

    // --- scalars ---

    pub async fn get(&mut self, key: &str) -> KvResult<Option<String>> {
        self.call(Command::new("GET").arg(key))
            .await?
            .into_optional_string()
    }

    pub async fn mget(&mut self, keys: &[String]) -> KvResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.call(Command::new("MGET").args(keys))
            .await?
            .into_optional_strings()
    }

    /// Returns whether the write happened.
    pub async fn set(
        &mut self,
        key: &str,
        value: &str,
        expiry: Option<Duration>,
        condition: SetCondition,
    ) -> KvResult<bool> {
        let mut command = Command::new("SET").arg(key).arg(value);
        if let Some(ttl) = expiry {
            command = command.arg("PX").arg(millis(ttl)?);
        }
        command = match condition {
            SetCondition::Always => command,
            SetCondition::NotExists => command.arg("NX"),
            SetCondition::Exists => command.arg("XX"),
        };
        self.call(command).await?.into_bool()
    }

    /// `SET ... GET`: write and return the previous value.
    pub async fn set_get(
        &mut self,
        key: &str,
        value: &str,
        expiry: Option<Duration>,
    ) -> KvResult<Option<String>> {
        let mut command = Command::new("SET").arg(key).arg(value);
        if let Some(ttl) = expiry {
            command = command.arg("PX").arg(millis(ttl)?);
        }
        self.call(command.arg("GET")).await?.into_optional_string()
    }

    pub async fn getset(&mut self, key: &str, value: &str) -> KvResult<Option<String>> {
        self.call(Command::new("GETSET").arg(key).arg(value))
            .await?
            .into_optional_string()
    }

    pub async fn incr_by(&mut self, key: &str, step: i64) -> KvResult<i64> {
        self.call(Command::new("INCRBY").arg(key).arg(step))
            .await?
            .into_integer()
    }

    pub async fn decr_by(&mut self, key: &str, step: i64) -> KvResult<i64> {
        self.call(Command::new("DECRBY").arg(key).arg(step))
            .await?
            .into_integer()
    }

    // --- hashes ---

    pub async fn hget(&mut self, key: &str, field: &str) -> KvResult<Option<String>> {
        self.call(Command::new("HGET").arg(key).arg(field))
            .await?
            .into_optional_string()
    }

    pub async fn hmget(&mut self, key: &str, fields: &[String]) -> KvResult<Vec<Option<String>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        self.call(Command::new("HMGET").arg(key).args(fields))
            .await?
            .into_optional_strings()
    }

    /// Returns the number of fields that were newly created.
    pub async fn hset(&mut self, key: &str, entries: &[(String, String)]) -> KvResult<u64> {
        if entries.is_empty() {
            return Ok(0);
        }
        let mut command = Command::new("HSET").arg(key);
        for (field, value) in entries {
            command = command.arg(field).arg(value);
        }
        Ok(self.call(command).await?.into_integer()? as u64)
    }

    pub async fn hsetnx(&mut self, key: &str, field: &str, value: &str) -> KvResult<bool> {
        self.call(Command::new("HSETNX").arg(key).arg(field).arg(value))
            .await?
            .into_bool()
    }

    pub async fn hdel(&mut self, key: &str, fields: &[String]) -> KvResult<u64> {
        if fields.is_empty() {
            return Ok(0);
        }
        let removed = self
            .call(Command::new("HDEL").arg(key).args(fields))
            .await?
            .into_integer()?;
        Ok(removed as u64)
    }

    pub async fn hexists(&mut self, key: &str, field: &str) -> KvResult<bool> {
        self.call(Command::new("HEXISTS").arg(key).arg(field))
            .await?
            .into_bool()
    }

    pub async fn hlen(&mut self, key: &str) -> KvResult<u64> {
        Ok(self.call(Command::new("HLEN").arg(key)).await?.into_integer()? as u64)
    }

    pub async fn hincr_by(&mut self, key: &str, field: &str, step: i64) -> KvResult<i64> {
        self.call(Command::new("HINCRBY").arg(key).arg(field).arg(step))
            .await?
            .into_integer()
    }

    pub async fn hkeys(&mut self, key: &str) -> KvResult<Vec<String>> {
        self.call(Command::new("HKEYS").arg(key)).await?.into_strings()
    }

    pub async fn hvals(&mut self, key: &str) -> KvResult<Vec<String>> {
        self.call(Command::new("HVALS").arg(key)).await?.into_strings()
    }

    pub async fn hgetall(&mut self, key: &str) -> KvResult<HashMap<String, String>> {
        let flat = self.call(Command::new("HGETALL").arg(key)).await?.into_strings()?;
        Ok(pairs(flat).into_iter().collect())
    }

    pub async fn hscan(
        &mut self,
        key: &str,
        cursor: u64,
        count: usize,
    ) -> KvResult<(u64, Vec<(String, String)>)> {
        let (next, flat) = self
            .call(Command::new("HSCAN").arg(key).arg(cursor).arg("COUNT").arg(count))
            .await?
            .into_scan_page()?;
        Ok((next, pairs(flat)))
    }

    // --- sets ---

    pub async fn sadd(&mut self, key: &str, members: &[String]) -> KvResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let added = self
            .call(Command::new("SADD").arg(key).args(members))
            .await?
            .into_integer()?;
        Ok(added as u64)
    }

    pub async fn srem(&mut self, key: &str, members: &[String]) -> KvResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let removed = self
            .call(Command::new("SREM").arg(key).args(members))
            .await?
            .into_integer()?;
        Ok(removed as u64)
    }

    pub async fn sismember(&mut self, key: &str, member: &str) -> KvResult<bool> {
        self.call(Command::new("SISMEMBER").arg(key).arg(member))
            .await?
            .into_bool()
    }

    pub async fn scard(&mut self, key: &str) -> KvResult<u64> {
        Ok(self.call(Command::new("SCARD").arg(key)).await?.into_integer()? as u64)
    }

    /// Up to `count` distinct random members.
    pub async fn srandmember(&mut self, key: &str, count: usize) -> KvResult<Vec<String>> {
        self.call(Command::new("SRANDMEMBER").arg(key).arg(count))
            .await?
            .into_strings()
    }

    pub async fn smove(&mut self, source: &str, destination: &str, member: &str) -> KvResult<bool> {
        self.call(Command::new("SMOVE").arg(source).arg(destination).arg(member))
            .await?
            .into_bool()
    }

    pub async fn smembers(&mut self, key: &str) -> KvResult<HashSet<String>> {
        let members = self.call(Command::new("SMEMBERS").arg(key)).await?.into_strings()?;
        Ok(members.into_iter().collect())
    }

    pub async fn sscan(
        &mut self,
        key: &str,
        cursor: u64,
        count: usize,
    ) -> KvResult<(u64, Vec<String>)> {
        self.call(Command::new("SSCAN").arg(key).arg(cursor).arg("COUNT").arg(count))
            .await?
            .into_scan_page()
    }

    pub async fn set_combine(
        &mut self,
        operation: SetOperation,
        keys: &[String],
    ) -> KvResult<HashSet<String>> {
        if keys.is_empty() {
            return Err(KvError::invalid_argument("At least one set name is required"));
        }
        let members = self
            .call(Command::new(operation.command()).args(keys))
            .await?
            .into_strings()?;
        Ok(members.into_iter().collect())
    }

    /// Stores the combination in `destination`, returning its size.
    pub async fn set_combine_store(
        &mut self,
        operation: SetOperation,
        destination: &str,
        keys: &[String],
    ) -> KvResult<u64> {
        if keys.is_empty() {
            return Err(KvError::invalid_argument("At least one set name is required"));
        }
        let size = self
            .call(Command::new(operation.store_command()).arg(destination).args(keys))
            .await?
            .into_integer()?;
        Ok(size as u64)
    }

    // --- lists ---

    pub async fn rpush(&mut self, key: &str, values: &[String]) -> KvResult<u64> {
        if values.is_empty() {
            return Ok(0);
        }
        let len = self
            .call(Command::new("RPUSH").arg(key).args(values))
            .await?
            .into_integer()?;
        Ok(len as u64)
    }

    pub async fn lpop(&mut self, key: &str) -> KvResult<Option<String>> {
        self.call(Command::new("LPOP").arg(key))
            .await?
            .into_optional_string()
    }

    pub async fn llen(&mut self, key: &str) -> KvResult<u64> {
        Ok(self.call(Command::new("LLEN").arg(key)).await?.into_integer()? as u64)
    }

    /// Inclusive range; negative indices count from the tail.
    pub async fn lrange(&mut self, key: &str, start: i64, stop: i64) -> KvResult<Vec<String>> {
        self.call(Command::new("LRANGE").arg(key).arg(start).arg(stop))
            .await?
            .into_strings()
    }

    pub async fn lindex(&mut self, key: &str, index: i64) -> KvResult<Option<String>> {
        self.call(Command::new("LINDEX").arg(key).arg(index))
            .await?
            .into_optional_string()
    }

    // --- pub/sub ---

    /// Returns the number of subscribers that received the message.
    pub async fn publish(&mut self, channel: &str, message: &str) -> KvResult<u64> {
        let receivers = self
            .call(Command::new("PUBLISH").arg(channel).arg(message))
            .await?
            .into_integer()?;
        Ok(receivers as u64)
    }
}

//! In-process store.
//!
//! Interprets the same command subset the TCP backend sends, over per-database
//! maps guarded by one mutex. Used for `memory://` store URLs and throughout the
//! test suite.

use super::resp::RespValue;
use crate::subscriber::ChannelMessage;
use rand::seq::{IteratorRandom, SliceRandom};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

type Outcome = Result<RespValue, RespValue>;

const DEFAULT_SCAN_COUNT: usize = 10;

#[derive(Debug, Clone)]
enum Value {
    Scalar(String),
    Dictionary(HashMap<String, String>),
    Set(HashSet<String>),
    List(VecDeque<String>),
    SortedSet(HashMap<String, f64>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "string",
            Value::Dictionary(_) => "hash",
            Value::Set(_) => "set",
            Value::List(_) => "list",
            Value::SortedSet(_) => "zset",
        }
    }

    fn is_empty_collection(&self) -> bool {
        match self {
            Value::Scalar(_) => false,
            Value::Dictionary(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::SortedSet(z) => z.is_empty(),
        }
    }
}

#[derive(Debug)]
struct Slot {
    value: Value,
    expires_at: Option<SystemTime>,
}

impl Slot {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// `$name(key)`: the value if it has the given shape, `None` if absent.
macro_rules! typed_get {
    ($name:ident, $variant:ident, $ty:ty) => {
        fn $name(&mut self, key: &str) -> Result<Option<&mut $ty>, RespValue> {
            match self.slot_mut(key).map(|slot| &mut slot.value) {
                None => Ok(None),
                Some(Value::$variant(inner)) => Ok(Some(inner)),
                Some(_) => Err(wrong_type()),
            }
        }
    };
}

/// `$name(key)`: the value with the given shape, created empty if absent.
macro_rules! typed_entry {
    ($name:ident, $variant:ident, $ty:ty) => {
        fn $name(&mut self, key: &str) -> Result<&mut $ty, RespValue> {
            self.purge(key);
            let slot = self
                .slots
                .entry(key.to_string())
                .or_insert_with(|| Slot::new(Value::$variant(Default::default())));
            match &mut slot.value {
                Value::$variant(inner) => Ok(inner),
                _ => Err(wrong_type()),
            }
        }
    };
}

#[derive(Debug, Default)]
struct Database {
    slots: HashMap<String, Slot>,
}

impl Database {
    fn purge(&mut self, key: &str) {
        if self
            .slots
            .get(key)
            .is_some_and(|slot| slot.is_expired(SystemTime::now()))
        {
            self.slots.remove(key);
        }
    }

    fn purge_all(&mut self) {
        let now = SystemTime::now();
        self.slots.retain(|_, slot| !slot.is_expired(now));
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Slot> {
        self.purge(key);
        self.slots.get_mut(key)
    }

    fn contains(&mut self, key: &str) -> bool {
        self.slot_mut(key).is_some()
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self
            .slots
            .get(key)
            .is_some_and(|slot| slot.value.is_empty_collection())
        {
            self.slots.remove(key);
        }
    }

    typed_get!(scalar, Scalar, String);
    typed_get!(hash, Dictionary, HashMap<String, String>);
    typed_get!(set, Set, HashSet<String>);
    typed_get!(list, List, VecDeque<String>);

    typed_entry!(hash_entry, Dictionary, HashMap<String, String>);
    typed_entry!(set_entry, Set, HashSet<String>);
    typed_entry!(list_entry, List, VecDeque<String>);
    typed_entry!(zset_entry, SortedSet, HashMap<String, f64>);

    fn sorted_keys(&mut self) -> Vec<String> {
        self.purge_all();
        let mut keys: Vec<String> = self.slots.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[derive(Debug, Default)]
struct State {
    databases: HashMap<u32, Database>,
    channels: HashMap<String, Vec<mpsc::UnboundedSender<ChannelMessage>>>,
}

impl State {
    fn publish(&mut self, args: &[String]) -> RespValue {
        if args.len() != 3 {
            return arity_error("publish");
        }
        let Some(senders) = self.channels.get_mut(&args[1]) else {
            return RespValue::Integer(0);
        };
        senders.retain(|tx| !tx.is_closed());

        let message = ChannelMessage {
            channel: args[1].clone(),
            payload: args[2].clone(),
        };
        let delivered = senders
            .iter()
            .filter(|tx| tx.send(message.clone()).is_ok())
            .count();
        RespValue::Integer(delivered as i64)
    }
}

/// A shared in-process store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    opened: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connect(&self) -> MemoryConnection {
        self.opened.fetch_add(1, Ordering::SeqCst);
        MemoryConnection {
            store: self.clone(),
        }
    }

    /// Number of connections opened against this store so far.
    pub fn connections_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Register a receiver for every listed channel.
    pub fn subscribe(&self, channels: &[String]) -> mpsc::UnboundedReceiver<ChannelMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        for channel in channels {
            state
                .channels
                .entry(channel.clone())
                .or_default()
                .push(tx.clone());
        }
        rx
    }

    /// Run one command against `database`.
    pub fn execute(&self, database: u32, args: &[Vec<u8>]) -> RespValue {
        let args: Vec<String> = args
            .iter()
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect();
        let Some(name) = args.first().map(|n| n.to_ascii_uppercase()) else {
            return error("ERR empty command");
        };

        let mut state = self.lock();
        if name == "PUBLISH" {
            return state.publish(&args);
        }

        let db = state.databases.entry(database).or_default();
        let reply = dispatch(db, &name, &args[1..]).unwrap_or_else(|e| e);
        for key in &args[1..] {
            db.drop_if_empty(key);
        }
        reply
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One logical connection to a `MemoryStore`.
pub struct MemoryConnection {
    store: MemoryStore,
}

impl MemoryConnection {
    pub fn execute(&self, database: u32, args: &[Vec<u8>]) -> RespValue {
        self.store.execute(database, args)
    }
}

fn dispatch(db: &mut Database, name: &str, args: &[String]) -> Outcome {
    match name {
        "PING" => Ok(RespValue::Simple("PONG".to_string())),
        "SELECT" | "AUTH" | "CLIENT" => Ok(ok()),
        "TYPE" => {
            arity("type", args, 1)?;
            let name = db
                .slot_mut(&args[0])
                .map_or("none", |slot| slot.value.type_name());
            Ok(RespValue::Simple(name.to_string()))
        }
        "GET" => {
            arity("get", args, 1)?;
            Ok(bulk(db.scalar(&args[0])?.cloned()))
        }
        "MGET" => {
            arity_min("mget", args, 1)?;
            let values = args
                .iter()
                .map(|key| bulk(db.scalar(key).ok().flatten().cloned()))
                .collect();
            Ok(RespValue::Array(values))
        }
        "SET" => cmd_set(db, args),
        "GETSET" => {
            arity("getset", args, 2)?;
            let previous = db.scalar(&args[0])?.cloned();
            db.slots
                .insert(args[0].clone(), Slot::new(Value::Scalar(args[1].clone())));
            Ok(bulk(previous))
        }
        "INCRBY" | "DECRBY" => {
            arity(&name.to_lowercase(), args, 2)?;
            let step = int_arg(&args[1])?;
            let step = (if name == "DECRBY" { step.checked_neg() } else { Some(step) })
                .ok_or_else(not_an_integer)?;
            cmd_incr(db, &args[0], step)
        }
        "DEL" => {
            arity_min("del", args, 1)?;
            let removed = args
                .iter()
                .filter(|key| {
                    db.purge(key);
                    db.slots.remove(key.as_str()).is_some()
                })
                .count();
            Ok(RespValue::Integer(removed as i64))
        }
        "EXISTS" => {
            arity_min("exists", args, 1)?;
            let found = args.iter().filter(|key| db.contains(key)).count();
            Ok(RespValue::Integer(found as i64))
        }
        "RENAME" => {
            arity("rename", args, 2)?;
            db.purge(&args[0]);
            let slot = db.slots.remove(&args[0]).ok_or_else(|| error("ERR no such key"))?;
            db.slots.insert(args[1].clone(), slot);
            Ok(ok())
        }
        "PEXPIRE" | "PEXPIREAT" => {
            arity(&name.to_lowercase(), args, 2)?;
            let ms = int_arg(&args[1])?;
            let at = if name == "PEXPIRE" {
                offset(SystemTime::now(), ms)
            } else {
                offset(UNIX_EPOCH, ms)
            };
            match db.slot_mut(&args[0]) {
                Some(slot) => slot.expires_at = Some(at),
                None => return Ok(RespValue::Integer(0)),
            }
            db.purge(&args[0]);
            Ok(RespValue::Integer(1))
        }
        "PTTL" => {
            arity("pttl", args, 1)?;
            let ms = match db.slot_mut(&args[0]) {
                None => -2,
                Some(Slot {
                    expires_at: None, ..
                }) => -1,
                Some(Slot {
                    expires_at: Some(at),
                    ..
                }) => at
                    .duration_since(SystemTime::now())
                    .map(|left| i64::try_from(left.as_millis()).unwrap_or(i64::MAX))
                    .unwrap_or(0),
            };
            Ok(RespValue::Integer(ms))
        }
        "SCAN" => {
            arity_min("scan", args, 1)?;
            let cursor = cursor_arg(&args[0])?;
            let (pattern, count) = scan_options(&args[1..])?;
            let keys = db.sorted_keys();
            Ok(scan_page(&keys, cursor, count, |key| {
                pattern.as_deref().is_none_or(|p| glob_match(p, key))
            }))
        }
        "FLUSHDB" => {
            db.slots.clear();
            Ok(ok())
        }

        "HGET" => {
            arity("hget", args, 2)?;
            Ok(bulk(db.hash(&args[0])?.and_then(|h| h.get(&args[1]).cloned())))
        }
        "HMGET" => {
            arity_min("hmget", args, 2)?;
            let hash = db.hash(&args[0])?;
            let values = args[1..]
                .iter()
                .map(|field| bulk(hash.as_ref().and_then(|h| h.get(field).cloned())))
                .collect();
            Ok(RespValue::Array(values))
        }
        "HSET" => {
            if args.len() < 3 || args.len() % 2 == 0 {
                return Err(arity_error("hset"));
            }
            let hash = db.hash_entry(&args[0])?;
            let created = args[1..]
                .chunks(2)
                .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
                .count();
            Ok(RespValue::Integer(created as i64))
        }
        "HSETNX" => {
            arity("hsetnx", args, 3)?;
            let hash = db.hash_entry(&args[0])?;
            if hash.contains_key(&args[1]) {
                return Ok(RespValue::Integer(0));
            }
            hash.insert(args[1].clone(), args[2].clone());
            Ok(RespValue::Integer(1))
        }
        "HDEL" => {
            arity_min("hdel", args, 2)?;
            let removed = match db.hash(&args[0])? {
                Some(hash) => args[1..]
                    .iter()
                    .filter(|field| hash.remove(field.as_str()).is_some())
                    .count(),
                None => 0,
            };
            Ok(RespValue::Integer(removed as i64))
        }
        "HEXISTS" => {
            arity("hexists", args, 2)?;
            let found = db.hash(&args[0])?.is_some_and(|h| h.contains_key(&args[1]));
            Ok(RespValue::Integer(found as i64))
        }
        "HLEN" => {
            arity("hlen", args, 1)?;
            Ok(RespValue::Integer(db.hash(&args[0])?.map_or(0, |h| h.len()) as i64))
        }
        "HINCRBY" => {
            arity("hincrby", args, 3)?;
            let step = int_arg(&args[2])?;
            let hash = db.hash_entry(&args[0])?;
            let current = match hash.get(&args[1]) {
                Some(value) => value
                    .parse::<i64>()
                    .map_err(|_| error("ERR hash value is not an integer"))?,
                None => 0,
            };
            let next = current.checked_add(step).ok_or_else(not_an_integer)?;
            hash.insert(args[1].clone(), next.to_string());
            Ok(RespValue::Integer(next))
        }
        "HKEYS" | "HVALS" | "HGETALL" => {
            arity(&name.to_lowercase(), args, 1)?;
            let Some(hash) = db.hash(&args[0])? else {
                return Ok(RespValue::Array(Vec::new()));
            };
            let items: Vec<String> = match name {
                "HKEYS" => hash.keys().cloned().collect(),
                "HVALS" => hash.values().cloned().collect(),
                _ => hash
                    .iter()
                    .flat_map(|(f, v)| [f.clone(), v.clone()])
                    .collect(),
            };
            Ok(array(items))
        }
        "HSCAN" => {
            arity_min("hscan", args, 2)?;
            let cursor = cursor_arg(&args[1])?;
            let (_, count) = scan_options(&args[2..])?;
            let mut fields: Vec<(String, String)> = db
                .hash(&args[0])?
                .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
                .unwrap_or_default();
            fields.sort();
            let start = (cursor as usize).min(fields.len());
            let end = (start + count).min(fields.len());
            let next = if end >= fields.len() { 0 } else { end };
            let flat = fields[start..end]
                .iter()
                .flat_map(|(f, v)| [f.clone(), v.clone()])
                .collect();
            Ok(RespValue::Array(vec![
                RespValue::Bulk(Some(next.to_string().into_bytes())),
                array(flat),
            ]))
        }

        "SADD" => {
            arity_min("sadd", args, 2)?;
            let set = db.set_entry(&args[0])?;
            let added = args[1..].iter().filter(|m| set.insert((*m).clone())).count();
            Ok(RespValue::Integer(added as i64))
        }
        "SREM" => {
            arity_min("srem", args, 2)?;
            let removed = match db.set(&args[0])? {
                Some(set) => args[1..].iter().filter(|m| set.remove(m.as_str())).count(),
                None => 0,
            };
            Ok(RespValue::Integer(removed as i64))
        }
        "SISMEMBER" => {
            arity("sismember", args, 2)?;
            let found = db.set(&args[0])?.is_some_and(|s| s.contains(&args[1]));
            Ok(RespValue::Integer(found as i64))
        }
        "SCARD" => {
            arity("scard", args, 1)?;
            Ok(RespValue::Integer(db.set(&args[0])?.map_or(0, |s| s.len()) as i64))
        }
        "SRANDMEMBER" => cmd_srandmember(db, args),
        "SMOVE" => {
            arity("smove", args, 3)?;
            db.set(&args[1])?;
            let moved = db.set(&args[0])?.is_some_and(|s| s.remove(&args[2]));
            if moved {
                db.set_entry(&args[1])?.insert(args[2].clone());
            }
            Ok(RespValue::Integer(moved as i64))
        }
        "SMEMBERS" => {
            arity("smembers", args, 1)?;
            let members = db
                .set(&args[0])?
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default();
            Ok(array(members))
        }
        "SSCAN" => {
            arity_min("sscan", args, 2)?;
            let cursor = cursor_arg(&args[1])?;
            let (pattern, count) = scan_options(&args[2..])?;
            let mut members: Vec<String> = db
                .set(&args[0])?
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default();
            members.sort();
            Ok(scan_page(&members, cursor, count, |member| {
                pattern.as_deref().is_none_or(|p| glob_match(p, member))
            }))
        }
        "SUNION" | "SINTER" | "SDIFF" => {
            arity_min(&name.to_lowercase(), args, 1)?;
            let members = combine(db, name, args)?;
            Ok(array(members.into_iter().collect()))
        }
        "SUNIONSTORE" | "SINTERSTORE" | "SDIFFSTORE" => {
            arity_min(&name.to_lowercase(), args, 2)?;
            let members = combine(db, name.trim_end_matches("STORE"), &args[1..])?;
            let size = members.len();
            db.slots.insert(args[0].clone(), Slot::new(Value::Set(members)));
            Ok(RespValue::Integer(size as i64))
        }

        "RPUSH" => {
            arity_min("rpush", args, 2)?;
            let list = db.list_entry(&args[0])?;
            list.extend(args[1..].iter().cloned());
            Ok(RespValue::Integer(list.len() as i64))
        }
        "LPOP" => {
            arity("lpop", args, 1)?;
            Ok(bulk(db.list(&args[0])?.and_then(|l| l.pop_front())))
        }
        "LLEN" => {
            arity("llen", args, 1)?;
            Ok(RespValue::Integer(db.list(&args[0])?.map_or(0, |l| l.len()) as i64))
        }
        "LRANGE" => {
            arity("lrange", args, 3)?;
            let (start, stop) = (int_arg(&args[1])?, int_arg(&args[2])?);
            let Some(list) = db.list(&args[0])? else {
                return Ok(RespValue::Array(Vec::new()));
            };
            let items = match normalize_range(start, stop, list.len()) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            };
            Ok(array(items))
        }
        "LINDEX" => {
            arity("lindex", args, 2)?;
            let index = int_arg(&args[1])?;
            let item = db.list(&args[0])?.and_then(|list| {
                let len = list.len() as i64;
                let index = if index < 0 { len + index } else { index };
                (0..len)
                    .contains(&index)
                    .then(|| list[index as usize].clone())
            });
            Ok(bulk(item))
        }

        "ZADD" => {
            if args.len() < 3 || args.len() % 2 == 0 {
                return Err(arity_error("zadd"));
            }
            let mut scored = Vec::with_capacity(args.len() / 2);
            for pair in args[1..].chunks(2) {
                let score: f64 = pair[0]
                    .parse()
                    .map_err(|_| error("ERR value is not a valid float"))?;
                scored.push((pair[1].clone(), score));
            }
            let zset = db.zset_entry(&args[0])?;
            let added = scored
                .into_iter()
                .filter(|(member, score)| zset.insert(member.clone(), *score).is_none())
                .count();
            Ok(RespValue::Integer(added as i64))
        }

        other => Err(error(&format!(
            "ERR unknown command '{}'",
            other.to_lowercase()
        ))),
    }
}

fn cmd_set(db: &mut Database, args: &[String]) -> Outcome {
    arity_min("set", args, 2)?;
    let (key, value) = (&args[0], &args[1]);

    let mut expires_at = None;
    let mut only_if: Option<bool> = None;
    let mut get = false;
    let mut i = 2;
    while i < args.len() {
        match args[i].to_ascii_uppercase().as_str() {
            unit @ ("PX" | "EX") => {
                let amount = int_arg(args.get(i + 1).ok_or_else(syntax_error)?)?;
                if amount <= 0 {
                    return Err(error("ERR invalid expire time in 'set' command"));
                }
                let ms = if unit == "EX" { amount.saturating_mul(1000) } else { amount };
                expires_at = Some(offset(SystemTime::now(), ms));
                i += 2;
            }
            "NX" => {
                only_if = Some(false);
                i += 1;
            }
            "XX" => {
                only_if = Some(true);
                i += 1;
            }
            "GET" => {
                get = true;
                i += 1;
            }
            _ => return Err(syntax_error()),
        }
    }

    let previous = if get { db.scalar(key)?.cloned() } else { None };
    let allowed = only_if.is_none_or(|must_exist| db.contains(key) == must_exist);
    if allowed {
        db.slots.insert(
            key.clone(),
            Slot {
                value: Value::Scalar(value.clone()),
                expires_at,
            },
        );
    }

    Ok(if get {
        bulk(previous)
    } else if allowed {
        ok()
    } else {
        RespValue::Bulk(None)
    })
}

fn cmd_incr(db: &mut Database, key: &str, step: i64) -> Outcome {
    let current = match db.scalar(key)? {
        Some(value) => value.parse::<i64>().map_err(|_| not_an_integer())?,
        None => 0,
    };
    let next = current.checked_add(step).ok_or_else(not_an_integer)?;
    match db.scalar(key)? {
        Some(value) => *value = next.to_string(),
        None => {
            db.slots
                .insert(key.to_string(), Slot::new(Value::Scalar(next.to_string())));
        }
    }
    Ok(RespValue::Integer(next))
}

fn cmd_srandmember(db: &mut Database, args: &[String]) -> Outcome {
    if args.is_empty() || args.len() > 2 {
        return Err(arity_error("srandmember"));
    }
    let count = args.get(1).map(|c| int_arg(c)).transpose()?;
    let mut rng = rand::thread_rng();
    let Some(set) = db.set(&args[0])? else {
        return Ok(match count {
            Some(_) => RespValue::Array(Vec::new()),
            None => RespValue::Bulk(None),
        });
    };

    match count {
        None => Ok(bulk(set.iter().choose(&mut rng).cloned())),
        Some(n) if n >= 0 => {
            let picked = set.iter().cloned().choose_multiple(&mut rng, n as usize);
            Ok(array(picked))
        }
        Some(n) => {
            let members: Vec<&String> = set.iter().collect();
            let picked = (0..n.unsigned_abs())
                .filter_map(|_| members.choose(&mut rng).map(|m| (*m).clone()))
                .collect();
            Ok(array(picked))
        }
    }
}

fn combine(db: &mut Database, name: &str, keys: &[String]) -> Result<HashSet<String>, RespValue> {
    let mut sets = Vec::with_capacity(keys.len());
    for key in keys {
        sets.push(db.set(key)?.map(|s| s.clone()).unwrap_or_default());
    }
    let mut iter = sets.into_iter();
    let first = iter.next().unwrap_or_default();
    Ok(match name {
        "SUNION" => iter.fold(first, |mut acc, set| {
            acc.extend(set);
            acc
        }),
        "SINTER" => iter.fold(first, |acc, set| acc.intersection(&set).cloned().collect()),
        _ => iter.fold(first, |acc, set| acc.difference(&set).cloned().collect()),
    })
}

fn scan_page(items: &[String], cursor: u64, count: usize, keep: impl Fn(&str) -> bool) -> RespValue {
    let start = (cursor as usize).min(items.len());
    let end = (start + count).min(items.len());
    let next = if end >= items.len() { 0 } else { end };
    let page = items[start..end]
        .iter()
        .filter(|item| keep(item))
        .cloned()
        .collect();
    RespValue::Array(vec![
        RespValue::Bulk(Some(next.to_string().into_bytes())),
        array(page),
    ])
}

fn scan_options(args: &[String]) -> Result<(Option<String>, usize), RespValue> {
    let mut pattern = None;
    let mut count = DEFAULT_SCAN_COUNT;
    let mut i = 0;
    while i < args.len() {
        let value = args.get(i + 1).ok_or_else(syntax_error)?;
        match args[i].to_ascii_uppercase().as_str() {
            "MATCH" => pattern = Some(value.clone()),
            "COUNT" => {
                count = int_arg(value)?
                    .try_into()
                    .ok()
                    .filter(|c| *c > 0)
                    .ok_or_else(syntax_error)?
            }
            _ => return Err(syntax_error()),
        }
        i += 2;
    }
    Ok((pattern, count))
}

fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    (start <= stop && start < len).then_some((start as usize, stop as usize))
}

fn offset(base: SystemTime, ms: i64) -> SystemTime {
    if ms >= 0 {
        base + Duration::from_millis(ms as u64)
    } else {
        base.checked_sub(Duration::from_millis(ms.unsigned_abs()))
            .unwrap_or(UNIX_EPOCH)
    }
}

/// Glob matching with `*`, `?` and `\` escapes.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some('*') => {
                star = Some((pi, ti));
                pi += 1;
                continue;
            }
            Some('?') => {
                pi += 1;
                ti += 1;
                continue;
            }
            Some('\\') if p.get(pi + 1) == Some(&t[ti]) => {
                pi += 2;
                ti += 1;
                continue;
            }
            Some(c) if *c != '\\' && *c == t[ti] => {
                pi += 1;
                ti += 1;
                continue;
            }
            _ => {}
        }
        match star {
            Some((star_pi, star_ti)) => {
                pi = star_pi + 1;
                ti = star_ti + 1;
                star = Some((star_pi, star_ti + 1));
            }
            None => return false,
        }
    }
    p[pi.min(p.len())..].iter().all(|c| *c == '*')
}

fn arity(name: &str, args: &[String], expected: usize) -> Result<(), RespValue> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(arity_error(name))
    }
}

fn arity_min(name: &str, args: &[String], min: usize) -> Result<(), RespValue> {
    if args.len() >= min {
        Ok(())
    } else {
        Err(arity_error(name))
    }
}

fn int_arg(value: &str) -> Result<i64, RespValue> {
    value.parse().map_err(|_| not_an_integer())
}

fn cursor_arg(value: &str) -> Result<u64, RespValue> {
    value.parse().map_err(|_| error("ERR invalid cursor"))
}

fn ok() -> RespValue {
    RespValue::Simple("OK".to_string())
}

fn bulk(value: Option<String>) -> RespValue {
    RespValue::Bulk(value.map(String::into_bytes))
}

fn array(items: Vec<String>) -> RespValue {
    RespValue::Array(items.into_iter().map(|s| bulk(Some(s))).collect())
}

fn error(message: &str) -> RespValue {
    RespValue::Error(message.to_string())
}

fn wrong_type() -> RespValue {
    error("WRONGTYPE Operation against a key holding the wrong kind of value")
}

fn not_an_integer() -> RespValue {
    error("ERR value is not an integer or out of range")
}

fn syntax_error() -> RespValue {
    error("ERR syntax error")
}

fn arity_error(name: &str) -> RespValue {
    error(&format!("ERR wrong number of arguments for '{}' command", name))
}

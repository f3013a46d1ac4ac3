use bytes::BytesMut;
use kestrel_types::response;

use crate::algorithm::dict::{hash_bytes, Dict, SlotId};
use crate::algorithm::heap::{self, HeapItem};
use crate::clock;
use crate::engine::pool::ThreadPool;
use crate::engine::zset::ZSet;
use crate::errors::ServerError;

/// Sorted sets larger than this are destroyed on the worker pool instead
/// of on the loop thread.
const LARGE_CONTAINER_SIZE: usize = 1000;
/// Expirations processed per sweep, to cap tail latency.
const MAX_EXPIRE_WORK: usize = 2000;

#[derive(Debug)]
pub(crate) enum EntryValue {
    Str(Vec<u8>),
    ZSet(ZSet),
}

/// A keyed value. The hash code lives on the dictionary node; `heap_index`
/// is the entry's slot in the TTL heap, kept current by the heap itself.
pub(crate) struct Entry {
    key: Vec<u8>,
    heap_index: Option<usize>,
    value: EntryValue,
}

/// The whole keyspace: every client-visible entry, the TTL heap over those
/// entries, and the pool that destroys large containers off-thread.
/// Owned exclusively by the event loop; commands execute serially.
pub(crate) struct Keyspace {
    index: Dict<Entry>,
    ttl: Vec<HeapItem>,
    destructor: ThreadPool,
}

impl Keyspace {
    pub(crate) fn new(threadpool_size: usize) -> Self {
        Self {
            index: Dict::new(),
            ttl: Vec::new(),
            destructor: ThreadPool::new(threadpool_size),
        }
    }

    /// Runs one parsed command, appending exactly one tagged value to
    /// `out`. Semantic failures become ERROR values; nothing here touches
    /// the connection.
    #[tracing::instrument(skip_all)]
    pub(crate) fn execute(&mut self, mut cmd: Vec<Vec<u8>>, out: &mut BytesMut) {
        let result = match cmd.split_first_mut() {
            Some((name, args)) => match (name.as_slice(), args) {
                (b"get", [key]) => self.get(key, out),
                (b"set", [key, value]) => {
                    self.set(std::mem::take(key), std::mem::take(value), out)
                }
                (b"del", [key]) => self.del(key, out),
                (b"keys", []) => self.keys(out),
                (b"pexpire", [key, ttl_ms]) => self.pexpire(key, ttl_ms, out),
                (b"pttl", [key]) => self.pttl(key, out),
                (b"zadd", [key, score, member]) => {
                    self.zadd(std::mem::take(key), score, member, out)
                }
                (b"zrem", [key, member]) => self.zrem(key, member, out),
                (b"zscore", [key, member]) => self.zscore(key, member, out),
                (b"zquery", [key, score, member, offset, limit]) => {
                    self.zquery(key, score, member, offset, limit, out)
                }
                _ => Err(ServerError::UnknownCommand),
            },
            None => Err(ServerError::UnknownCommand),
        };
        if let Err(err) = result {
            response::error(out, err.code(), &err.to_string());
        }
    }

    /// Earliest TTL deadline, for the event loop's poll timeout.
    pub(crate) fn next_deadline(&self) -> Option<u64> {
        self.ttl.first().map(|item| item.deadline)
    }

    /// Removes every entry whose deadline has passed, up to the per-sweep
    /// work budget; the remainder rolls over to the next tick.
    pub(crate) fn evict_expired(&mut self, now_ms: u64) {
        let mut work = 0;
        while work < MAX_EXPIRE_WORK {
            let slot = match self.ttl.first() {
                Some(item) if item.deadline < now_ms => item.entry,
                _ => break,
            };
            let entry = self.index.remove_slot(slot);
            log::debug!("expiring key {}", String::from_utf8_lossy(&entry.key));
            self.destroy_entry(entry);
            work += 1;
        }
    }

    #[tracing::instrument(skip(self, out))]
    fn get(&mut self, key: &[u8], out: &mut BytesMut) -> Result<(), ServerError> {
        match self.lookup(key) {
            None => response::nil(out),
            Some(slot) => match &self.index.value(slot).value {
                EntryValue::Str(data) => response::string(out, data),
                EntryValue::ZSet(_) => return Err(ServerError::BadType("not a string value")),
            },
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, out))]
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>, out: &mut BytesMut) -> Result<(), ServerError> {
        match self.lookup(&key) {
            Some(slot) => match &mut self.index.value_mut(slot).value {
                EntryValue::Str(data) => *data = value,
                EntryValue::ZSet(_) => {
                    return Err(ServerError::BadType("a non-string value exists"))
                }
            },
            None => {
                let hcode = hash_bytes(&key);
                self.index.insert(
                    hcode,
                    Entry {
                        key,
                        heap_index: None,
                        value: EntryValue::Str(value),
                    },
                );
            }
        }
        response::nil(out);
        Ok(())
    }

    #[tracing::instrument(skip(self, out))]
    fn del(&mut self, key: &[u8], out: &mut BytesMut) -> Result<(), ServerError> {
        let removed = self.index.remove(hash_bytes(key), |entry| entry.key == key);
        let found = removed.is_some();
        if let Some(entry) = removed {
            self.destroy_entry(entry);
        }
        response::integer(out, found as i64);
        Ok(())
    }

    #[tracing::instrument(skip(self, out))]
    fn keys(&mut self, out: &mut BytesMut) -> Result<(), ServerError> {
        response::array(out, self.index.len() as u32);
        self.index.for_each(|entry| {
            response::string(out, &entry.key);
            true
        });
        Ok(())
    }

    #[tracing::instrument(skip(self, out))]
    fn pexpire(&mut self, key: &[u8], ttl_ms: &[u8], out: &mut BytesMut) -> Result<(), ServerError> {
        let ttl_ms = parse_int(ttl_ms).ok_or(ServerError::BadArgument("expect integer"))?;
        match self.lookup(key) {
            None => response::integer(out, 0),
            Some(slot) => {
                self.set_ttl(slot, ttl_ms);
                response::integer(out, 1);
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, out))]
    fn pttl(&mut self, key: &[u8], out: &mut BytesMut) -> Result<(), ServerError> {
        let remaining = match self.lookup(key) {
            None => -2,
            Some(slot) => match self.index.value(slot).heap_index {
                None => -1,
                Some(pos) => {
                    let deadline = self.ttl[pos].deadline;
                    deadline.saturating_sub(clock::monotonic_ms()) as i64
                }
            },
        };
        response::integer(out, remaining);
        Ok(())
    }

    #[tracing::instrument(skip(self, out))]
    fn zadd(
        &mut self,
        key: Vec<u8>,
        score: &[u8],
        member: &[u8],
        out: &mut BytesMut,
    ) -> Result<(), ServerError> {
        let score = parse_double(score).ok_or(ServerError::BadArgument("expect float"))?;
        let slot = match self.lookup(&key) {
            Some(slot) => slot,
            None => {
                let hcode = hash_bytes(&key);
                self.index.insert(
                    hcode,
                    Entry {
                        key,
                        heap_index: None,
                        value: EntryValue::ZSet(ZSet::new()),
                    },
                )
            }
        };
        match &mut self.index.value_mut(slot).value {
            EntryValue::ZSet(zset) => {
                let added = zset.insert(member, score);
                response::integer(out, added as i64);
                Ok(())
            }
            EntryValue::Str(_) => Err(ServerError::BadType("expecting a sorted set")),
        }
    }

    #[tracing::instrument(skip(self, out))]
    fn zrem(&mut self, key: &[u8], member: &[u8], out: &mut BytesMut) -> Result<(), ServerError> {
        let removed = match self.lookup_zset(key)? {
            Some(zset) => match zset.lookup(member) {
                Some(node) => {
                    zset.remove(node);
                    true
                }
                None => false,
            },
            None => false,
        };
        response::integer(out, removed as i64);
        Ok(())
    }

    #[tracing::instrument(skip(self, out))]
    fn zscore(&mut self, key: &[u8], member: &[u8], out: &mut BytesMut) -> Result<(), ServerError> {
        let score = match self.lookup_zset(key)? {
            Some(zset) => zset.lookup(member).map(|node| zset.node(node).score),
            None => None,
        };
        match score {
            Some(score) => response::double(out, score),
            None => response::nil(out),
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, out))]
    fn zquery(
        &mut self,
        key: &[u8],
        score: &[u8],
        member: &[u8],
        offset: &[u8],
        limit: &[u8],
        out: &mut BytesMut,
    ) -> Result<(), ServerError> {
        let score = parse_double(score).ok_or(ServerError::BadArgument("expect float"))?;
        let offset = parse_int(offset).ok_or(ServerError::BadArgument("expect integer"))?;
        let limit = parse_int(limit).ok_or(ServerError::BadArgument("expect integer"))?;

        let zset = match self.lookup_zset(key)? {
            Some(zset) => zset,
            None => {
                response::array(out, 0);
                return Ok(());
            }
        };
        if limit <= 0 {
            response::array(out, 0);
            return Ok(());
        }

        let mut cursor = zset
            .seek_ge(score, member)
            .and_then(|node| zset.offset(node, offset));
        let ctx = response::begin_array(out);
        let mut emitted: i64 = 0;
        while let Some(node) = cursor {
            if emitted >= limit {
                break;
            }
            let entry = zset.node(node);
            response::string(out, &entry.name);
            response::double(out, entry.score);
            emitted += 2;
            cursor = zset.offset(node, 1);
        }
        response::end_array(out, ctx, emitted as u32);
        Ok(())
    }

    fn lookup(&mut self, key: &[u8]) -> Option<SlotId> {
        self.index.lookup(hash_bytes(key), |entry| entry.key == key)
    }

    /// The sorted set under `key`: `Ok(None)` when the key is absent (the
    /// caller treats that as an empty set), an error when the key holds
    /// another type.
    fn lookup_zset(&mut self, key: &[u8]) -> Result<Option<&mut ZSet>, ServerError> {
        match self.lookup(key) {
            None => Ok(None),
            Some(slot) => match &mut self.index.value_mut(slot).value {
                EntryValue::ZSet(zset) => Ok(Some(zset)),
                EntryValue::Str(_) => Err(ServerError::BadType("expecting a sorted set")),
            },
        }
    }

    /// Applies the TTL policy: a negative ttl clears any existing deadline
    /// (idempotently), otherwise the deadline is set `ttl_ms` from now.
    fn set_ttl(&mut self, slot: SlotId, ttl_ms: i64) {
        let Keyspace { index, ttl, .. } = self;
        let pos = index.value(slot).heap_index;
        if ttl_ms < 0 {
            if let Some(pos) = pos {
                heap::delete(ttl, pos, &mut |entry, at| {
                    index.value_mut(entry).heap_index = Some(at)
                });
                index.value_mut(slot).heap_index = None;
            }
        } else {
            let deadline = clock::monotonic_ms() + ttl_ms as u64;
            heap::upsert(
                ttl,
                pos,
                HeapItem {
                    deadline,
                    entry: slot,
                },
                &mut |entry, at| index.value_mut(entry).heap_index = Some(at),
            );
        }
    }

    /// Final teardown of an entry already unlinked from the dictionary:
    /// the TTL slot goes first to keep the heap consistent, then the
    /// payload is freed, off-thread when it is a large sorted set.
    fn destroy_entry(&mut self, mut entry: Entry) {
        if let Some(pos) = entry.heap_index.take() {
            let Keyspace { index, ttl, .. } = self;
            heap::delete(ttl, pos, &mut |moved, at| {
                index.value_mut(moved).heap_index = Some(at)
            });
        }
        let large = matches!(&entry.value, EntryValue::ZSet(zset) if zset.len() > LARGE_CONTAINER_SIZE);
        if large {
            self.destructor.submit(move || drop(entry));
        }
    }
}

/// Full-string base-10 integer parse.
fn parse_int(arg: &[u8]) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

/// Full-string float parse; NaN is not a usable score.
fn parse_double(arg: &[u8]) -> Option<f64> {
    let value: f64 = std::str::from_utf8(arg).ok()?.parse().ok()?;
    (!value.is_nan()).then_some(value)
}

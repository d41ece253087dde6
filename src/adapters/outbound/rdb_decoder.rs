//! RDB Snapshot Decoder
//!
//! Streaming decoder for the source's RDB snapshot format. Reads the pipe
//! incrementally and emits one [`SnapshotEntry`] per key, field or member,
//! so memory use is bounded by the largest single compact-encoded value
//! rather than by the snapshot size.
//!
//! RDB layout: `REDIS` magic, 4-digit version, opcodes and typed key/value
//! records, `0xFF`, then an 8-byte checksum (version 5 and later).

use crate::domain::entities::SnapshotEntry;
use crate::domain::errors::SessionError;
use crate::domain::ports::{SnapshotDecoder, SnapshotHandler};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

// ---------------------------------------------------------------------------
// Format constants
// ---------------------------------------------------------------------------

const RDB_MAGIC: &[u8] = b"REDIS";
const MIN_VERSION: u32 = 1;
const MAX_VERSION: u32 = 12;

const OPCODE_SLOT_INFO: u8 = 0xF4;
const OPCODE_FUNCTION2: u8 = 0xF5;
const OPCODE_FUNCTION_PRE_GA: u8 = 0xF6;
const OPCODE_MODULE_AUX: u8 = 0xF7;
const OPCODE_IDLE: u8 = 0xF8;
const OPCODE_FREQ: u8 = 0xF9;
const OPCODE_AUX: u8 = 0xFA;
const OPCODE_RESIZEDB: u8 = 0xFB;
const OPCODE_EXPIRETIME_MS: u8 = 0xFC;
const OPCODE_EXPIRETIME: u8 = 0xFD;
const OPCODE_SELECTDB: u8 = 0xFE;
const OPCODE_EOF: u8 = 0xFF;

const TYPE_STRING: u8 = 0;
const TYPE_LIST: u8 = 1;
const TYPE_SET: u8 = 2;
const TYPE_ZSET: u8 = 3;
const TYPE_HASH: u8 = 4;
const TYPE_ZSET_2: u8 = 5;
const TYPE_HASH_ZIPMAP: u8 = 9;
const TYPE_LIST_ZIPLIST: u8 = 10;
const TYPE_SET_INTSET: u8 = 11;
const TYPE_ZSET_ZIPLIST: u8 = 12;
const TYPE_HASH_ZIPLIST: u8 = 13;
const TYPE_LIST_QUICKLIST: u8 = 14;
const TYPE_HASH_LISTPACK: u8 = 16;
const TYPE_ZSET_LISTPACK: u8 = 17;
const TYPE_LIST_QUICKLIST_2: u8 = 18;
const TYPE_SET_LISTPACK: u8 = 20;

const ENC_INT8: u8 = 0;
const ENC_INT16: u8 = 1;
const ENC_INT32: u8 = 2;
const ENC_LZF: u8 = 3;

const QUICKLIST_NODE_PLAIN: u64 = 1;

/// Largest single string accepted; larger lengths mean a corrupt stream.
const MAX_STRING_LEN: u64 = 512 * 1024 * 1024;

type Result<T> = std::result::Result<T, SessionError>;

fn read_failed(e: io::Error) -> SessionError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        SessionError::decode("unexpected end of snapshot")
    } else {
        SessionError::decode(format!("snapshot read failed: {e}"))
    }
}

fn type_name(value_type: u8) -> &'static str {
    match value_type {
        6 | 7 => "module",
        TYPE_HASH_ZIPMAP => "zipmap hash",
        15 | 19 | 21 => "stream",
        _ => "unknown",
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// RDB implementation of [`SnapshotDecoder`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RdbDecoder;

impl RdbDecoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SnapshotDecoder for RdbDecoder {
    async fn decode(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        handler: &mut dyn SnapshotHandler,
    ) -> Result<()> {
        let mut rdb = RdbReader::new(reader);
        let version = rdb.read_header().await?;
        tracing::debug!("snapshot format version {}", version);
        handler.handle(SnapshotEntry::Begin).await?;

        let mut expire_at_ms: Option<u64> = None;
        let mut keys: u64 = 0;

        loop {
            let opcode = rdb.read_u8().await?;
            match opcode {
                OPCODE_EOF => {
                    if version >= 5 {
                        rdb.skip(8).await?;
                    }
                    break;
                }
                OPCODE_SELECTDB => {
                    let db = rdb.read_len().await?;
                    let db = u32::try_from(db)
                        .map_err(|_| SessionError::decode(format!("database index {db} out of range")))?;
                    handler.handle(SnapshotEntry::SelectDb(db)).await?;
                }
                OPCODE_RESIZEDB => {
                    let db_size = rdb.read_len().await?;
                    let expires_size = rdb.read_len().await?;
                    tracing::debug!("database holds {} keys ({} with expiry)", db_size, expires_size);
                }
                OPCODE_AUX => {
                    let field = rdb.read_string().await?;
                    let value = rdb.read_string().await?;
                    tracing::debug!(
                        "snapshot aux {}={}",
                        String::from_utf8_lossy(&field),
                        String::from_utf8_lossy(&value)
                    );
                }
                OPCODE_EXPIRETIME_MS => {
                    expire_at_ms = Some(rdb.read_u64_le().await?);
                }
                OPCODE_EXPIRETIME => {
                    expire_at_ms = Some(u64::from(rdb.read_u32_le().await?) * 1000);
                }
                OPCODE_FREQ => {
                    rdb.read_u8().await?;
                }
                OPCODE_IDLE => {
                    rdb.read_len().await?;
                }
                OPCODE_FUNCTION2 => {
                    rdb.read_string().await?;
                    tracing::warn!("snapshot contains a function library; it is not migrated");
                }
                OPCODE_SLOT_INFO => {
                    for _ in 0..3 {
                        rdb.read_len().await?;
                    }
                }
                OPCODE_MODULE_AUX | OPCODE_FUNCTION_PRE_GA => {
                    return Err(SessionError::decode(format!(
                        "unsupported snapshot opcode {opcode:#04x}"
                    )));
                }
                value_type => {
                    let key = rdb.read_string().await?;
                    rdb.read_object(value_type, key, expire_at_ms.take(), handler)
                        .await?;
                    keys += 1;
                }
            }
        }

        handler.handle(SnapshotEntry::End).await?;
        tracing::info!("snapshot decoded ({} keys)", keys);

        let trailing = rdb.drain().await?;
        if trailing > 0 {
            tracing::warn!("ignored {} byte(s) after end of snapshot", trailing);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stream reader
// ---------------------------------------------------------------------------

/// Length prefix: a plain length or a special string encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Length {
    Plain(u64),
    Encoded(u8),
}

struct RdbReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin + Send> RdbReader<R> {
    fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
        }
    }

    async fn read_header(&mut self) -> Result<u32> {
        let mut header = [0u8; 9];
        self.inner
            .read_exact(&mut header)
            .await
            .map_err(read_failed)?;
        if &header[..5] != RDB_MAGIC {
            return Err(SessionError::decode("invalid snapshot magic"));
        }
        let version = std::str::from_utf8(&header[5..])
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| SessionError::decode("invalid snapshot version"))?;
        if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
            return Err(SessionError::decode(format!(
                "unsupported snapshot version {version}"
            )));
        }
        Ok(version)
    }

    async fn read_u8(&mut self) -> Result<u8> {
        self.inner.read_u8().await.map_err(read_failed)
    }

    async fn read_u32_le(&mut self) -> Result<u32> {
        self.inner.read_u32_le().await.map_err(read_failed)
    }

    async fn read_u64_le(&mut self) -> Result<u64> {
        self.inner.read_u64_le().await.map_err(read_failed)
    }

    async fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>> {
        if len > MAX_STRING_LEN {
            return Err(SessionError::decode(format!("string length {len} exceeds limit")));
        }
        let mut buf = vec![0u8; len as usize];
        self.inner.read_exact(&mut buf).await.map_err(read_failed)?;
        Ok(buf)
    }

    async fn skip(&mut self, len: u64) -> Result<()> {
        let copied = tokio::io::copy(&mut (&mut self.inner).take(len), &mut tokio::io::sink())
            .await
            .map_err(read_failed)?;
        if copied < len {
            return Err(SessionError::decode("unexpected end of snapshot"));
        }
        Ok(())
    }

    async fn drain(&mut self) -> Result<u64> {
        tokio::io::copy(&mut self.inner, &mut tokio::io::sink())
            .await
            .map_err(read_failed)
    }

    async fn read_length(&mut self) -> Result<Length> {
        let first = self.read_u8().await?;
        match first >> 6 {
            0 => Ok(Length::Plain(u64::from(first & 0x3F))),
            1 => {
                let next = self.read_u8().await?;
                Ok(Length::Plain((u64::from(first & 0x3F) << 8) | u64::from(next)))
            }
            2 => match first {
                0x80 => Ok(Length::Plain(u64::from(
                    self.inner.read_u32().await.map_err(read_failed)?,
                ))),
                0x81 => Ok(Length::Plain(self.inner.read_u64().await.map_err(read_failed)?)),
                _ => Err(SessionError::decode(format!("invalid length prefix {first:#04x}"))),
            },
            _ => Ok(Length::Encoded(first & 0x3F)),
        }
    }

    async fn read_len(&mut self) -> Result<u64> {
        match self.read_length().await? {
            Length::Plain(n) => Ok(n),
            Length::Encoded(_) => Err(SessionError::decode("encoded value where a length was expected")),
        }
    }

    /// Length-prefixed, integer-encoded, or LZF-compressed string.
    async fn read_string(&mut self) -> Result<Bytes> {
        match self.read_length().await? {
            Length::Plain(n) => Ok(Bytes::from(self.read_bytes(n).await?)),
            Length::Encoded(ENC_INT8) => {
                let v = self.inner.read_i8().await.map_err(read_failed)?;
                Ok(int_bytes(i64::from(v)))
            }
            Length::Encoded(ENC_INT16) => {
                let v = self.inner.read_i16_le().await.map_err(read_failed)?;
                Ok(int_bytes(i64::from(v)))
            }
            Length::Encoded(ENC_INT32) => {
                let v = self.inner.read_i32_le().await.map_err(read_failed)?;
                Ok(int_bytes(i64::from(v)))
            }
            Length::Encoded(ENC_LZF) => {
                let compressed_len = self.read_len().await?;
                let raw_len = self.read_len().await?;
                if raw_len > MAX_STRING_LEN {
                    return Err(SessionError::decode(format!(
                        "string length {raw_len} exceeds limit"
                    )));
                }
                let compressed = self.read_bytes(compressed_len).await?;
                lzf_decompress(&compressed, raw_len as usize).map(Bytes::from)
            }
            Length::Encoded(other) => Err(SessionError::decode(format!(
                "unknown string encoding {other}"
            ))),
        }
    }

    /// Sorted-set score in the text form of the oldest zset encoding.
    async fn read_text_score(&mut self) -> Result<f64> {
        match self.read_u8().await? {
            253 => Err(SessionError::decode("sorted set score is NaN")),
            254 => Ok(f64::INFINITY),
            255 => Ok(f64::NEG_INFINITY),
            len => {
                let raw = self.read_bytes(u64::from(len)).await?;
                parse_score(&raw)
            }
        }
    }

    async fn read_object(
        &mut self,
        value_type: u8,
        key: Bytes,
        expire_at_ms: Option<u64>,
        handler: &mut dyn SnapshotHandler,
    ) -> Result<()> {
        match value_type {
            TYPE_STRING => {
                let value = self.read_string().await?;
                return handler
                    .handle(SnapshotEntry::Set {
                        key,
                        value,
                        expire_at_ms,
                    })
                    .await;
            }
            TYPE_LIST => {
                let len = self.read_len().await?;
                handler
                    .handle(SnapshotEntry::ListStart {
                        key: key.clone(),
                        len,
                        expire_at_ms,
                    })
                    .await?;
                for _ in 0..len {
                    let element = self.read_string().await?;
                    handler.handle(SnapshotEntry::ListElement(element)).await?;
                }
                return handler.handle(SnapshotEntry::ListEnd { key }).await;
            }
            TYPE_LIST_ZIPLIST => {
                let blob = self.read_string().await?;
                let elements = ziplist_entries(&blob)?;
                return emit_list(handler, key, elements, expire_at_ms).await;
            }
            TYPE_LIST_QUICKLIST | TYPE_LIST_QUICKLIST_2 => {
                let nodes = self.read_len().await?;
                let mut elements = Vec::new();
                for _ in 0..nodes {
                    if value_type == TYPE_LIST_QUICKLIST {
                        let blob = self.read_string().await?;
                        elements.extend(ziplist_entries(&blob)?);
                    } else {
                        let container = self.read_len().await?;
                        let blob = self.read_string().await?;
                        if container == QUICKLIST_NODE_PLAIN {
                            elements.push(blob);
                        } else {
                            elements.extend(listpack_entries(&blob)?);
                        }
                    }
                }
                return emit_list(handler, key, elements, expire_at_ms).await;
            }
            TYPE_SET => {
                let len = self.read_len().await?;
                for _ in 0..len {
                    let member = self.read_string().await?;
                    handler
                        .handle(SnapshotEntry::SetMember {
                            key: key.clone(),
                            member,
                        })
                        .await?;
                }
            }
            TYPE_SET_INTSET | TYPE_SET_LISTPACK => {
                let blob = self.read_string().await?;
                let members = if value_type == TYPE_SET_INTSET {
                    intset_entries(&blob)?
                } else {
                    listpack_entries(&blob)?
                };
                for member in members {
                    handler
                        .handle(SnapshotEntry::SetMember {
                            key: key.clone(),
                            member,
                        })
                        .await?;
                }
            }
            TYPE_ZSET | TYPE_ZSET_2 => {
                let len = self.read_len().await?;
                for _ in 0..len {
                    let member = self.read_string().await?;
                    let score = if value_type == TYPE_ZSET {
                        self.read_text_score().await?
                    } else {
                        checked_score(self.inner.read_f64_le().await.map_err(read_failed)?)?
                    };
                    handler
                        .handle(SnapshotEntry::SortedSetMember {
                            key: key.clone(),
                            score,
                            member,
                        })
                        .await?;
                }
            }
            TYPE_ZSET_ZIPLIST | TYPE_ZSET_LISTPACK => {
                let blob = self.read_string().await?;
                let flat = if value_type == TYPE_ZSET_ZIPLIST {
                    ziplist_entries(&blob)?
                } else {
                    listpack_entries(&blob)?
                };
                for (member, score) in pairs(flat)? {
                    let score = parse_score(&score)?;
                    handler
                        .handle(SnapshotEntry::SortedSetMember {
                            key: key.clone(),
                            score,
                            member,
                        })
                        .await?;
                }
            }
            TYPE_HASH => {
                let len = self.read_len().await?;
                for _ in 0..len {
                    let field = self.read_string().await?;
                    let value = self.read_string().await?;
                    handler
                        .handle(SnapshotEntry::HashField {
                            key: key.clone(),
                            field,
                            value,
                        })
                        .await?;
                }
            }
            TYPE_HASH_ZIPLIST | TYPE_HASH_LISTPACK => {
                let blob = self.read_string().await?;
                let flat = if value_type == TYPE_HASH_ZIPLIST {
                    ziplist_entries(&blob)?
                } else {
                    listpack_entries(&blob)?
                };
                for (field, value) in pairs(flat)? {
                    handler
                        .handle(SnapshotEntry::HashField {
                            key: key.clone(),
                            field,
                            value,
                        })
                        .await?;
                }
            }
            other => {
                return Err(SessionError::decode(format!(
                    "unsupported value type {other} ({}) for key {:?}",
                    type_name(other),
                    String::from_utf8_lossy(&key)
                )));
            }
        }

        if let Some(expire_at_ms) = expire_at_ms {
            handler
                .handle(SnapshotEntry::Expire { key, expire_at_ms })
                .await?;
        }
        Ok(())
    }
}

async fn emit_list(
    handler: &mut dyn SnapshotHandler,
    key: Bytes,
    elements: Vec<Bytes>,
    expire_at_ms: Option<u64>,
) -> Result<()> {
    handler
        .handle(SnapshotEntry::ListStart {
            key: key.clone(),
            len: elements.len() as u64,
            expire_at_ms,
        })
        .await?;
    for element in elements {
        handler.handle(SnapshotEntry::ListElement(element)).await?;
    }
    handler.handle(SnapshotEntry::ListEnd { key }).await
}

fn pairs(flat: Vec<Bytes>) -> Result<Vec<(Bytes, Bytes)>> {
    if flat.len() % 2 != 0 {
        return Err(SessionError::decode("odd number of entries in a paired encoding"));
    }
    let mut out = Vec::with_capacity(flat.len() / 2);
    let mut iter = flat.into_iter();
    while let (Some(a), Some(b)) = (iter.next(), iter.next()) {
        out.push((a, b));
    }
    Ok(out)
}

fn int_bytes(v: i64) -> Bytes {
    Bytes::from(v.to_string())
}

fn parse_score(raw: &[u8]) -> Result<f64> {
    let score = std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| SessionError::decode("invalid sorted set score"))?;
    checked_score(score)
}

/// The target rejects NaN scores, so they never leave the decoder.
fn checked_score(score: f64) -> Result<f64> {
    if score.is_nan() {
        return Err(SessionError::decode("sorted set score is NaN"));
    }
    Ok(score)
}

// ---------------------------------------------------------------------------
// Compact encodings (in-memory blobs)
// ---------------------------------------------------------------------------

fn take<'a>(data: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if data.len() < n {
        return Err(SessionError::decode("truncated compact encoding"));
    }
    let (head, tail) = data.split_at(n);
    *data = tail;
    Ok(head)
}

fn take_u8(data: &mut &[u8]) -> Result<u8> {
    Ok(take(data, 1)?[0])
}

fn take_u16_le(data: &mut &[u8]) -> Result<u16> {
    let b = take(data, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

fn take_u32_le(data: &mut &[u8]) -> Result<u32> {
    let b = take(data, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn take_u32_be(data: &mut &[u8]) -> Result<u32> {
    let b = take(data, 4)?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Little-endian signed integer of `n` bytes (1..=8).
fn take_int_le(data: &mut &[u8], n: usize) -> Result<i64> {
    let b = take(data, n)?;
    let mut raw = [0u8; 8];
    raw[..n].copy_from_slice(b);
    let unsigned = u64::from_le_bytes(raw);
    let shift = 64 - 8 * n as u32;
    Ok(((unsigned << shift) as i64) >> shift)
}

/// Entries of a ziplist blob, integers rendered as decimal text.
fn ziplist_entries(blob: &[u8]) -> Result<Vec<Bytes>> {
    let mut data = blob;
    let _total_bytes = take_u32_le(&mut data)?;
    let _tail_offset = take_u32_le(&mut data)?;
    let count = take_u16_le(&mut data)?;
    let mut out = Vec::with_capacity(usize::from(count));

    loop {
        let prev_len = take_u8(&mut data)?;
        if prev_len == 0xFF {
            break;
        }
        if prev_len == 0xFE {
            take(&mut data, 4)?;
        }

        let enc = take_u8(&mut data)?;
        let entry = match enc >> 6 {
            0 => Bytes::copy_from_slice(take(&mut data, usize::from(enc & 0x3F))?),
            1 => {
                let next = take_u8(&mut data)?;
                let len = (usize::from(enc & 0x3F) << 8) | usize::from(next);
                Bytes::copy_from_slice(take(&mut data, len)?)
            }
            2 => {
                let len = take_u32_be(&mut data)? as usize;
                Bytes::copy_from_slice(take(&mut data, len)?)
            }
            _ => match enc {
                0xC0 => int_bytes(take_int_le(&mut data, 2)?),
                0xD0 => int_bytes(take_int_le(&mut data, 4)?),
                0xE0 => int_bytes(take_int_le(&mut data, 8)?),
                0xF0 => int_bytes(take_int_le(&mut data, 3)?),
                0xFE => int_bytes(take_int_le(&mut data, 1)?),
                0xF1..=0xFD => int_bytes(i64::from(enc & 0x0F) - 1),
                _ => {
                    return Err(SessionError::decode(format!(
                        "invalid ziplist encoding {enc:#04x}"
                    )))
                }
            },
        };
        out.push(entry);
    }

    Ok(out)
}

/// Bytes used by a listpack back-length field for an entry of `len` bytes.
fn listpack_backlen_size(len: usize) -> usize {
    match len {
        0..=127 => 1,
        128..=16382 => 2,
        16383..=2097150 => 3,
        2097151..=268435454 => 4,
        _ => 5,
    }
}

/// Entries of a listpack blob, integers rendered as decimal text.
fn listpack_entries(blob: &[u8]) -> Result<Vec<Bytes>> {
    let mut data = blob;
    let _total_bytes = take_u32_le(&mut data)?;
    let count = take_u16_le(&mut data)?;
    let mut out = Vec::with_capacity(usize::from(count));

    loop {
        let enc = take_u8(&mut data)?;
        if enc == 0xFF {
            break;
        }

        let (entry, entry_len) = if enc & 0x80 == 0 {
            (int_bytes(i64::from(enc & 0x7F)), 1)
        } else if enc & 0xC0 == 0x80 {
            let len = usize::from(enc & 0x3F);
            (Bytes::copy_from_slice(take(&mut data, len)?), 1 + len)
        } else if enc & 0xE0 == 0xC0 {
            let next = take_u8(&mut data)?;
            let raw = (i64::from(enc & 0x1F) << 8) | i64::from(next);
            let value = if raw >= 1 << 12 { raw - (1 << 13) } else { raw };
            (int_bytes(value), 2)
        } else if enc & 0xF0 == 0xE0 {
            let next = take_u8(&mut data)?;
            let len = (usize::from(enc & 0x0F) << 8) | usize::from(next);
            (Bytes::copy_from_slice(take(&mut data, len)?), 2 + len)
        } else {
            match enc {
                0xF0 => {
                    let len = take_u32_le(&mut data)? as usize;
                    (Bytes::copy_from_slice(take(&mut data, len)?), 5 + len)
                }
                0xF1 => (int_bytes(take_int_le(&mut data, 2)?), 3),
                0xF2 => (int_bytes(take_int_le(&mut data, 3)?), 4),
                0xF3 => (int_bytes(take_int_le(&mut data, 4)?), 5),
                0xF4 => (int_bytes(take_int_le(&mut data, 8)?), 9),
                _ => {
                    return Err(SessionError::decode(format!(
                        "invalid listpack encoding {enc:#04x}"
                    )))
                }
            }
        };

        take(&mut data, listpack_backlen_size(entry_len))?;
        out.push(entry);
    }

    Ok(out)
}

/// Members of an intset blob.
fn intset_entries(blob: &[u8]) -> Result<Vec<Bytes>> {
    let mut data = blob;
    let width = take_u32_le(&mut data)? as usize;
    if !matches!(width, 2 | 4 | 8) {
        return Err(SessionError::decode(format!("invalid intset width {width}")));
    }
    let len = take_u32_le(&mut data)? as usize;
    let mut out = Vec::with_capacity(len.min(data.len() / width));
    for _ in 0..len {
        out.push(int_bytes(take_int_le(&mut data, width)?));
    }
    Ok(out)
}

/// Decompress an LZF-compressed string.
///
/// Control bytes below 32 start a literal run; larger ones are
/// back-references into the output produced so far.
fn lzf_decompress(input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let corrupt = || SessionError::decode("corrupt LZF string");
    let mut output = Vec::with_capacity(expected_len);
    let mut ip = 0;

    while ip < input.len() {
        let ctrl = usize::from(input[ip]);
        ip += 1;

        if ctrl < 32 {
            let count = ctrl + 1;
            let literal = input.get(ip..ip + count).ok_or_else(corrupt)?;
            output.extend_from_slice(literal);
            ip += count;
        } else {
            let mut len = ctrl >> 5;
            if len == 7 {
                len += usize::from(*input.get(ip).ok_or_else(corrupt)?);
                ip += 1;
            }
            len += 2;

            let low = usize::from(*input.get(ip).ok_or_else(corrupt)?);
            ip += 1;
            let offset = ((ctrl & 0x1F) << 8) | low;

            let start = output.len().checked_sub(offset + 1).ok_or_else(corrupt)?;
            // Overlapping copy repeats the run.
            for i in 0..len {
                let byte = output[start + i];
                output.push(byte);
            }
        }
    }

    if output.len() != expected_len {
        return Err(corrupt());
    }
    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

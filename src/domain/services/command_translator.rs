//! Command Translator Service
//!
//! Pure domain logic turning decoded snapshot entries into target write
//! commands. This service performs no I/O: callers hand the returned
//! payloads to the sender in order.

use crate::domain::entities::SnapshotEntry;
use crate::domain::errors::SessionError;
use bytes::{BufMut, Bytes, BytesMut};

/// Encode one command as an array of bulk strings.
///
/// `*<argc>\r\n` followed by `$<len>\r\n<arg>\r\n` for every argument.
pub fn encode_command(args: &[&[u8]]) -> Bytes {
    let payload: usize = args.iter().map(|a| a.len() + 16).sum();
    let mut buf = BytesMut::with_capacity(16 + payload);
    buf.put_u8(b'*');
    buf.put_slice(args.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");
    for arg in args {
        buf.put_u8(b'$');
        buf.put_slice(arg.len().to_string().as_bytes());
        buf.put_slice(b"\r\n");
        buf.put_slice(arg);
        buf.put_slice(b"\r\n");
    }
    buf.freeze()
}

/// Render a sorted-set score the way the target parses it back.
pub fn format_score(score: f64) -> String {
    if score == f64::INFINITY {
        "+inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}

/// Translator behaviour switches.
#[derive(Debug, Clone, Copy)]
pub struct TranslatorOptions {
    /// Forward database selection as `SELECT`
    pub select_db: bool,
    /// Follow keys carrying an expiry with `PEXPIREAT`
    pub preserve_ttl: bool,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        Self {
            select_db: true,
            preserve_ttl: true,
        }
    }
}

/// A list being rebuilt from incremental entries.
#[derive(Debug)]
struct OpenList {
    key: Bytes,
    elements: Vec<Bytes>,
    expire_at_ms: Option<u64>,
}

/// Stateful translator for one snapshot.
///
/// Holds the open list accumulation and the boundary markers; everything
/// else is formatted directly from the entry.
#[derive(Debug)]
pub struct CommandTranslator {
    options: TranslatorOptions,
    open_list: Option<OpenList>,
    began: bool,
    ended: bool,
    entries: u64,
}

impl CommandTranslator {
    /// Create a translator for a fresh snapshot.
    pub fn new(options: TranslatorOptions) -> Self {
        Self {
            options,
            open_list: None,
            began: false,
            ended: false,
            entries: 0,
        }
    }

    /// Number of entries translated so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// True once both boundary markers were seen and no list is open.
    pub fn is_complete(&self) -> bool {
        self.began && self.ended && self.open_list.is_none()
    }

    /// Translate one entry into zero or more commands, in send order.
    pub fn translate(&mut self, entry: SnapshotEntry) -> Result<Vec<Bytes>, SessionError> {
        self.entries += 1;

        if let Some(open) = &self.open_list {
            match &entry {
                SnapshotEntry::ListElement(_) | SnapshotEntry::ListEnd { .. } => {}
                other => {
                    return Err(SessionError::decode(format!(
                        "{} entry while list {:?} is open",
                        other.kind(),
                        String::from_utf8_lossy(&open.key)
                    )))
                }
            }
        }

        if self.ended {
            return Err(SessionError::decode(format!(
                "{} entry after end of snapshot",
                entry.kind()
            )));
        }
        if !self.began && entry != SnapshotEntry::Begin {
            return Err(SessionError::decode(format!(
                "{} entry before start of snapshot",
                entry.kind()
            )));
        }

        match entry {
            SnapshotEntry::Begin => {
                if self.began {
                    return Err(SessionError::decode("duplicate start of snapshot"));
                }
                self.began = true;
                Ok(Vec::new())
            }
            SnapshotEntry::End => {
                self.ended = true;
                Ok(Vec::new())
            }
            SnapshotEntry::SelectDb(db) => {
                if !self.options.select_db {
                    return Ok(Vec::new());
                }
                let db = db.to_string();
                Ok(vec![encode_command(&[b"SELECT", db.as_bytes()])])
            }
            SnapshotEntry::Set {
                key,
                value,
                expire_at_ms,
            } => {
                let mut cmds = vec![encode_command(&[b"SET", &key, &value])];
                cmds.extend(self.expire(&key, expire_at_ms));
                Ok(cmds)
            }
            SnapshotEntry::HashField { key, field, value } => {
                Ok(vec![encode_command(&[b"HSET", &key, &field, &value])])
            }
            SnapshotEntry::SetMember { key, member } => {
                Ok(vec![encode_command(&[b"SADD", &key, &member])])
            }
            SnapshotEntry::SortedSetMember { key, score, member } => {
                if score.is_nan() {
                    return Err(SessionError::decode("sorted set score is NaN"));
                }
                let score = format_score(score);
                Ok(vec![encode_command(&[b"ZADD", &key, score.as_bytes(), &member])])
            }
            SnapshotEntry::Expire { key, expire_at_ms } => {
                Ok(self.expire(&key, Some(expire_at_ms)).into_iter().collect())
            }
            SnapshotEntry::ListStart {
                key,
                len,
                expire_at_ms,
            } => {
                // Capacity hint only; the declared count is not trusted.
                let capacity = usize::try_from(len).unwrap_or(0).min(1024);
                self.open_list = Some(OpenList {
                    key,
                    elements: Vec::with_capacity(capacity),
                    expire_at_ms,
                });
                Ok(Vec::new())
            }
            SnapshotEntry::ListElement(value) => match self.open_list.as_mut() {
                Some(open) => {
                    open.elements.push(value);
                    Ok(Vec::new())
                }
                None => Err(SessionError::decode("list element outside of a list")),
            },
            SnapshotEntry::ListEnd { key } => {
                let open = self
                    .open_list
                    .take()
                    .ok_or_else(|| SessionError::decode("list end without a list start"))?;
                if open.key != key {
                    return Err(SessionError::decode(format!(
                        "list end for {:?} while {:?} is open",
                        String::from_utf8_lossy(&key),
                        String::from_utf8_lossy(&open.key)
                    )));
                }
                Ok(self.flush_list(open))
            }
        }
    }

    /// `DEL key` then a single `RPUSH key e1 .. eN`.
    fn flush_list(&self, open: OpenList) -> Vec<Bytes> {
        let mut cmds = vec![encode_command(&[b"DEL", &open.key])];
        if !open.elements.is_empty() {
            let mut args: Vec<&[u8]> = Vec::with_capacity(open.elements.len() + 2);
            args.push(b"RPUSH");
            args.push(&open.key);
            args.extend(open.elements.iter().map(|e| e.as_ref()));
            cmds.push(encode_command(&args));
            cmds.extend(self.expire(&open.key, open.expire_at_ms));
        }
        cmds
    }

    fn expire(&self, key: &[u8], expire_at_ms: Option<u64>) -> Option<Bytes> {
        if !self.options.preserve_ttl {
            return None;
        }
        expire_at_ms.map(|ms| {
            let ms = ms.to_string();
            encode_command(&[b"PEXPIREAT", key, ms.as_bytes()])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn started(options: TranslatorOptions) -> CommandTranslator {
        let mut t = CommandTranslator::new(options);
        assert!(t.translate(SnapshotEntry::Begin).unwrap().is_empty());
        t
    }

    // ===== Encoding Tests =====

    #[test]
    fn test_encode_set_exact_bytes() {
        let cmd = encode_command(&[b"SET", b"k", b"v"]);
        assert_eq!(&cmd[..], b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
    }

    #[test]
    fn test_encode_binary_and_empty_args() {
        let cmd = encode_command(&[b"SET", b"\r\n", b""]);
        assert_eq!(&cmd[..], b"*3\r\n$3\r\nSET\r\n$2\r\n\r\n\r\n$0\r\n\r\n");
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(1.0), "1");
        assert_eq!(format_score(1.5), "1.5");
        assert_eq!(format_score(-0.25), "-0.25");
        assert_eq!(format_score(f64::INFINITY), "+inf");
        assert_eq!(format_score(f64::NEG_INFINITY), "-inf");
    }

    // ===== Translation Tests =====

    #[test]
    fn test_scalar_becomes_set() {
        let mut t = started(TranslatorOptions::default());
        let cmds = t
            .translate(SnapshotEntry::Set {
                key: b("k"),
                value: b("v"),
                expire_at_ms: None,
            })
            .unwrap();
        assert_eq!(cmds.len(), 1);
        assert_eq!(&cmds[0][..], b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
    }

    #[test]
    fn test_scalar_with_expiry_adds_pexpireat() {
        let mut t = started(TranslatorOptions::default());
        let cmds = t
            .translate(SnapshotEntry::Set {
                key: b("k"),
                value: b("v"),
                expire_at_ms: Some(1700000000000),
            })
            .unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[1], encode_command(&[b"PEXPIREAT", b"k", b"1700000000000"]));
    }

    #[test]
    fn test_expiry_dropped_when_disabled() {
        let mut t = started(TranslatorOptions {
            preserve_ttl: false,
            ..Default::default()
        });
        let cmds = t
            .translate(SnapshotEntry::Set {
                key: b("k"),
                value: b("v"),
                expire_at_ms: Some(42),
            })
            .unwrap();
        assert_eq!(cmds.len(), 1);
        assert!(t
            .translate(SnapshotEntry::Expire {
                key: b("h"),
                expire_at_ms: 42
            })
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_hash_set_and_zset_members() {
        let mut t = started(TranslatorOptions::default());

        let hset = t
            .translate(SnapshotEntry::HashField {
                key: b("h"),
                field: b("f"),
                value: b("v"),
            })
            .unwrap();
        assert_eq!(hset, vec![encode_command(&[b"HSET", b"h", b"f", b"v"])]);

        let sadd = t
            .translate(SnapshotEntry::SetMember {
                key: b("s"),
                member: b("m"),
            })
            .unwrap();
        assert_eq!(sadd, vec![encode_command(&[b"SADD", b"s", b"m"])]);

        let zadd = t
            .translate(SnapshotEntry::SortedSetMember {
                key: b("z"),
                score: 2.5,
                member: b("m"),
            })
            .unwrap();
        assert_eq!(zadd, vec![encode_command(&[b"ZADD", b"z", b"2.5", b"m"])]);
    }

    #[test]
    fn test_nan_score_rejected() {
        let mut t = started(TranslatorOptions::default());
        let err = t
            .translate(SnapshotEntry::SortedSetMember {
                key: b("z"),
                score: f64::NAN,
                member: b("m"),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::Decode(_)));
    }

    #[test]
    fn test_list_is_batched_into_del_and_single_rpush() {
        let mut t = started(TranslatorOptions::default());

        assert!(t
            .translate(SnapshotEntry::ListStart {
                key: b("k"),
                len: 2,
                expire_at_ms: None
            })
            .unwrap()
            .is_empty());
        assert!(t.translate(SnapshotEntry::ListElement(b("a"))).unwrap().is_empty());
        assert!(t.translate(SnapshotEntry::ListElement(b("b"))).unwrap().is_empty());

        let cmds = t.translate(SnapshotEntry::ListEnd { key: b("k") }).unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(&cmds[0][..], b"*2\r\n$3\r\nDEL\r\n$1\r\nk\r\n");
        assert_eq!(
            &cmds[1][..],
            b"*4\r\n$5\r\nRPUSH\r\n$1\r\nk\r\n$1\r\na\r\n$1\r\nb\r\n"
        );
    }

    #[test]
    fn test_empty_list_only_deletes() {
        let mut t = started(TranslatorOptions::default());
        t.translate(SnapshotEntry::ListStart {
            key: b("k"),
            len: 0,
            expire_at_ms: Some(5),
        })
        .unwrap();
        let cmds = t.translate(SnapshotEntry::ListEnd { key: b("k") }).unwrap();
        assert_eq!(cmds, vec![encode_command(&[b"DEL", b"k"])]);
    }

    #[test]
    fn test_list_with_expiry() {
        let mut t = started(TranslatorOptions::default());
        t.translate(SnapshotEntry::ListStart {
            key: b("k"),
            len: 1,
            expire_at_ms: Some(99),
        })
        .unwrap();
        t.translate(SnapshotEntry::ListElement(b("a"))).unwrap();
        let cmds = t.translate(SnapshotEntry::ListEnd { key: b("k") }).unwrap();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[2], encode_command(&[b"PEXPIREAT", b"k", b"99"]));
    }

    #[test]
    fn test_select_db_forwarding() {
        let mut t = started(TranslatorOptions::default());
        let cmds = t.translate(SnapshotEntry::SelectDb(2)).unwrap();
        assert_eq!(cmds, vec![encode_command(&[b"SELECT", b"2"])]);

        let mut single = started(TranslatorOptions {
            select_db: false,
            ..Default::default()
        });
        assert!(single.translate(SnapshotEntry::SelectDb(2)).unwrap().is_empty());
    }

    // ===== Sequencing Tests =====

    #[test]
    fn test_boundaries_complete_snapshot() {
        let mut t = CommandTranslator::new(TranslatorOptions::default());
        assert!(!t.is_complete());
        t.translate(SnapshotEntry::Begin).unwrap();
        assert!(!t.is_complete());
        t.translate(SnapshotEntry::End).unwrap();
        assert!(t.is_complete());
        assert_eq!(t.entries(), 2);
    }

    #[test]
    fn test_entry_before_begin_rejected() {
        let mut t = CommandTranslator::new(TranslatorOptions::default());
        let err = t.translate(SnapshotEntry::SelectDb(0)).unwrap_err();
        assert!(matches!(err, SessionError::Decode(_)));
    }

    #[test]
    fn test_entry_after_end_rejected() {
        let mut t = started(TranslatorOptions::default());
        t.translate(SnapshotEntry::End).unwrap();
        assert!(t.translate(SnapshotEntry::SelectDb(0)).is_err());
    }

    #[test]
    fn test_element_without_list_rejected() {
        let mut t = started(TranslatorOptions::default());
        assert!(t.translate(SnapshotEntry::ListElement(b("a"))).is_err());
        assert!(t.translate(SnapshotEntry::ListEnd { key: b("k") }).is_err());
    }

    #[test]
    fn test_other_entry_inside_open_list_rejected() {
        let mut t = started(TranslatorOptions::default());
        t.translate(SnapshotEntry::ListStart {
            key: b("k"),
            len: 1,
            expire_at_ms: None,
        })
        .unwrap();
        let err = t
            .translate(SnapshotEntry::SetMember {
                key: b("s"),
                member: b("m"),
            })
            .unwrap_err();
        assert!(err.to_string().contains("while list"));
    }

    #[test]
    fn test_mismatched_list_end_rejected() {
        let mut t = started(TranslatorOptions::default());
        t.translate(SnapshotEntry::ListStart {
            key: b("k"),
            len: 1,
            expire_at_ms: None,
        })
        .unwrap();
        assert!(t.translate(SnapshotEntry::ListEnd { key: b("other") }).is_err());
    }

    #[test]
    fn test_end_with_open_list_is_incomplete() {
        let mut t = started(TranslatorOptions::default());
        t.translate(SnapshotEntry::ListStart {
            key: b("k"),
            len: 1,
            expire_at_ms: None,
        })
        .unwrap();
        assert!(t.translate(SnapshotEntry::End).is_err());
        assert!(!t.is_complete());
    }
}

//! Binary image of a whole program pool.
//!
//! Layout: the magic bytes `CNDR`, a format version, then every pool entry
//! sorted by owner and name, all encoded with postcard.

use crate::bytecode::program::Program;
use crate::runtime::{ProgramPool, RuntimeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const MAGIC: [u8; 4] = *b"CNDR";
pub const VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to encode image: {0}")]
    Encode(postcard::Error),

    #[error("malformed image: {0}")]
    Decode(postcard::Error),

    #[error("not a program image")]
    BadMagic,

    #[error("unsupported image version {found} (expected {})", VERSION)]
    UnsupportedVersion { found: u32 },

    #[error(transparent)]
    Pool(#[from] RuntimeError),
}

#[derive(Serialize, Deserialize)]
struct Header {
    magic: [u8; 4],
    version: u32,
}

#[derive(Serialize)]
struct EntryRef<'a> {
    owner: &'a str,
    name: &'a str,
    program: &'a Program,
}

#[derive(Deserialize)]
struct Entry {
    owner: String,
    name: String,
    program: Program,
}

pub fn encode(pool: &ProgramPool) -> Result<Vec<u8>, ImageError> {
    let header = Header {
        magic: MAGIC,
        version: VERSION,
    };
    let entries: Vec<EntryRef> = pool
        .entries()
        .into_iter()
        .map(|(key, program)| EntryRef {
            owner: &key.owner,
            name: &key.name,
            program,
        })
        .collect();

    let mut bytes = postcard::to_allocvec(&header).map_err(ImageError::Encode)?;
    bytes.extend(postcard::to_allocvec(&entries).map_err(ImageError::Encode)?);
    Ok(bytes)
}

/// Rebuild a pool from an image. Every entry goes through
/// [`ProgramPool::put`], so duplicates and invalid programs are rejected.
pub fn decode(bytes: &[u8]) -> Result<ProgramPool, ImageError> {
    let (header, rest) =
        postcard::take_from_bytes::<Header>(bytes).map_err(ImageError::Decode)?;

    if header.magic != MAGIC {
        return Err(ImageError::BadMagic);
    }
    if header.version != VERSION {
        return Err(ImageError::UnsupportedVersion {
            found: header.version,
        });
    }

    let entries: Vec<Entry> = postcard::from_bytes(rest).map_err(ImageError::Decode)?;

    let mut pool = ProgramPool::new();
    for entry in entries {
        pool.put(&entry.owner, &entry.name, entry.program)?;
    }

    debug!(programs = pool.len(), bytes = bytes.len(), "image decoded");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{CONSTRUCTOR, CodeGen, Op, Temp};
    use crate::runtime::ErrorKind;

    fn sample_pool() -> ProgramPool {
        let mut pool = ProgramPool::new();

        let ctor = CodeGen::compile_object(2, |cg| {
            cg.emit_string("ready");
            Ok(())
        })
        .unwrap();
        pool.put("Player", CONSTRUCTOR, ctor).unwrap();

        let mut cg = CodeGen::new(1);
        cg.emit_number(0.5);
        cg.emit_return();
        pool.put("Object", "speed", cg.finish().unwrap()).unwrap();

        pool
    }

    #[test]
    fn test_image_preserves_pool() {
        let pool = sample_pool();
        let restored = decode(&encode(&pool).unwrap()).unwrap();

        assert_eq!(restored.len(), pool.len());
        for (key, program) in pool.entries() {
            assert_eq!(restored.get(&key.owner, &key.name).unwrap(), program);
        }
    }

    #[test]
    fn test_image_starts_with_magic() {
        let bytes = encode(&sample_pool()).unwrap();
        assert_eq!(&bytes[..4], b"CNDR");
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = encode(&sample_pool()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(ImageError::BadMagic)));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = encode(&sample_pool()).unwrap();
        bytes[4] = 9;
        assert!(matches!(
            decode(&bytes),
            Err(ImageError::UnsupportedVersion { found: 9 })
        ));
    }

    #[test]
    fn test_truncated_image() {
        let bytes = encode(&sample_pool()).unwrap();
        assert!(matches!(decode(&bytes[..3]), Err(ImageError::Decode(_))));
        assert!(matches!(
            decode(&bytes[..bytes.len() - 2]),
            Err(ImageError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_validates_programs() {
        let header = Header {
            magic: MAGIC,
            version: VERSION,
        };
        let bad = Program::from_parts(0, vec![Op::Jmp(7)], vec![], vec![]);
        let entries = vec![EntryRef {
            owner: "Player",
            name: "broken",
            program: &bad,
        }];
        let mut bytes = postcard::to_allocvec(&header).unwrap();
        bytes.extend(postcard::to_allocvec(&entries).unwrap());

        match decode(&bytes) {
            Err(ImageError::Pool(e)) => {
                assert!(matches!(e.kind, ErrorKind::InvalidProgram { .. }))
            }
            other => panic!("expected pool error, got {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_decode_rejects_duplicate_entries() {
        let header = Header {
            magic: MAGIC,
            version: VERSION,
        };
        let mut cg = CodeGen::new(0);
        cg.builder().add_line(Op::Movt(Temp::T3, Temp::T0));
        cg.builder().add_line(Op::Ret);
        let program = cg.finish().unwrap();
        let entry = || EntryRef {
            owner: "Player",
            name: "update",
            program: &program,
        };
        let mut bytes = postcard::to_allocvec(&header).unwrap();
        bytes.extend(postcard::to_allocvec(&vec![entry(), entry()]).unwrap());

        match decode(&bytes) {
            Err(ImageError::Pool(e)) => {
                assert!(matches!(e.kind, ErrorKind::DuplicateProgram { .. }))
            }
            other => panic!("expected duplicate error, got {:?}", other.map(|p| p.len())),
        }
    }
}

//! Wire framing for the reconciliation protocol (spec §6).
//!
//! Every helper here is a thin, allocation-minimal wrapper over
//! `tokio::io::{AsyncReadExt, AsyncWriteExt}`, generic over the half-stream
//! types so the same code path drives a `quinn` send/recv stream pair in
//! `demo_sync.rs` and a `tokio::io::duplex` pair in tests — the teacher's
//! `network.rs` always bincode-serializes a whole `ProtocolMessage` in one
//! shot; the spec instead prescribes byte-level framing, so this module
//! speaks the framing directly rather than going through `bincode`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SyncError;
use crate::event::EventHash;
use crate::generations::GraphGenerations;

pub const SYNC_REQUEST: u8 = 0x42;
pub const SYNC_ACK: u8 = 0x43;
pub const SYNC_NACK: u8 = 0x44;
pub const SYNC_DONE: u8 = 0x45;
pub const EVENT_NEXT: u8 = 0x48;
pub const EVENT_DONE: u8 = 0x4A;

pub async fn write_u8<W: AsyncWrite + Unpin>(w: &mut W, byte: u8) -> Result<(), SyncError> {
    w.write_u8(byte).await.map_err(SyncError::Io)
}

pub async fn read_u8<R: AsyncRead + Unpin>(r: &mut R) -> Result<u8, SyncError> {
    r.read_u8().await.map_err(SyncError::Io)
}

pub async fn write_i64<W: AsyncWrite + Unpin>(w: &mut W, v: i64) -> Result<(), SyncError> {
    w.write_all(&v.to_be_bytes()).await.map_err(SyncError::Io)
}

pub async fn read_i64<R: AsyncRead + Unpin>(r: &mut R) -> Result<i64, SyncError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).await.map_err(SyncError::Io)?;
    Ok(i64::from_be_bytes(buf))
}

pub async fn write_u32<W: AsyncWrite + Unpin>(w: &mut W, v: u32) -> Result<(), SyncError> {
    w.write_all(&v.to_be_bytes()).await.map_err(SyncError::Io)
}

pub async fn read_u32<R: AsyncRead + Unpin>(r: &mut R) -> Result<u32, SyncError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).await.map_err(SyncError::Io)?;
    Ok(u32::from_be_bytes(buf))
}

pub async fn write_generations<W: AsyncWrite + Unpin>(
    w: &mut W,
    g: &GraphGenerations,
) -> Result<(), SyncError> {
    write_i64(w, g.min_round_generation()).await?;
    write_i64(w, g.min_gen_non_ancient()).await?;
    write_i64(w, g.max_round_generation()).await?;
    Ok(())
}

pub async fn read_generations<R: AsyncRead + Unpin>(
    r: &mut R,
    phase: &'static str,
) -> Result<GraphGenerations, SyncError> {
    let min_round = read_i64(r).await?;
    let min_non_ancient = read_i64(r).await?;
    let max_round = read_i64(r).await?;
    GraphGenerations::new(min_round, min_non_ancient, max_round).map_err(|e| SyncError::Protocol {
        phase,
        detail: e.to_string(),
    })
}

pub async fn write_hash_list<W: AsyncWrite + Unpin>(
    w: &mut W,
    hashes: &[EventHash],
) -> Result<(), SyncError> {
    write_u32(w, hashes.len() as u32).await?;
    for hash in hashes {
        w.write_all(hash).await.map_err(SyncError::Io)?;
    }
    Ok(())
}

pub async fn read_hash_list<R: AsyncRead + Unpin>(
    r: &mut R,
    max_len: u32,
    phase: &'static str,
) -> Result<Vec<EventHash>, SyncError> {
    let len = read_u32(r).await?;
    if len > max_len {
        return Err(SyncError::Protocol {
            phase,
            detail: format!("tip list length {len} exceeds bound {max_len}"),
        });
    }
    let mut hashes = Vec::with_capacity(len as usize);
    for _ in 0..len {
        let mut hash = [0u8; 32];
        r.read_exact(&mut hash).await.map_err(SyncError::Io)?;
        hashes.push(hash);
    }
    Ok(hashes)
}

pub async fn write_bool_list<W: AsyncWrite + Unpin>(
    w: &mut W,
    bools: &[bool],
) -> Result<(), SyncError> {
    write_u32(w, bools.len() as u32).await?;
    let bytes: Vec<u8> = bools.iter().map(|b| u8::from(*b)).collect();
    w.write_all(&bytes).await.map_err(SyncError::Io)
}

pub async fn read_bool_list<R: AsyncRead + Unpin>(
    r: &mut R,
    expected_len: usize,
    phase: &'static str,
) -> Result<Vec<bool>, SyncError> {
    let len = read_u32(r).await? as usize;
    if len != expected_len {
        return Err(SyncError::Protocol {
            phase,
            detail: format!("boolean vector length {len} does not match expected {expected_len}"),
        });
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await.map_err(SyncError::Io)?;
    Ok(buf.into_iter().map(|b| b != 0).collect())
}

pub async fn write_length_prefixed<W: AsyncWrite + Unpin>(
    w: &mut W,
    bytes: &[u8],
) -> Result<(), SyncError> {
    write_u32(w, bytes.len() as u32).await?;
    w.write_all(bytes).await.map_err(SyncError::Io)
}

pub async fn read_length_prefixed<R: AsyncRead + Unpin>(
    r: &mut R,
    max_len: u32,
    phase: &'static str,
) -> Result<Vec<u8>, SyncError> {
    let len = read_u32(r).await?;
    if len > max_len {
        return Err(SyncError::Protocol {
            phase,
            detail: format!("record of length {len} exceeds bound {max_len}"),
        });
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).await.map_err(SyncError::Io)?;
    Ok(buf)
}

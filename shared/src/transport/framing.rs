//! Byte layout shared by stream and datagram based transports.
//!
//! A reliable channel is one ordered byte stream that starts with the
//! big-endian channel id, followed by frames of a big-endian `u32` length and
//! that many payload bytes. An unreliable packet is a single datagram made of
//! the big-endian channel id followed by the payload.

use crate::types::ChannelId;

pub const CHANNEL_HEADER_SIZE: usize = 4;
pub const FRAME_HEADER_SIZE: usize = 4;
/// Largest payload a reliable frame may carry
pub const MAX_FRAME_SIZE: usize = 10_000_000;

pub fn channel_header(channel: ChannelId) -> [u8; CHANNEL_HEADER_SIZE] {
    channel.to_be_bytes()
}

/// Length prefix for a frame, or `None` if `len` exceeds [`MAX_FRAME_SIZE`]
pub fn frame_header(len: usize) -> Option<[u8; FRAME_HEADER_SIZE]> {
    if len > MAX_FRAME_SIZE {
        return None;
    }
    u32::try_from(len).ok().map(u32::to_be_bytes)
}

pub fn read_header(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes)
}

pub fn encode_datagram(channel: ChannelId, payload: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(CHANNEL_HEADER_SIZE + payload.len());
    datagram.extend_from_slice(&channel_header(channel));
    datagram.extend_from_slice(payload);
    datagram
}

/// Splits a datagram into its channel and payload. `None` if it is too short
/// to carry a channel header.
pub fn decode_datagram(datagram: &[u8]) -> Option<(ChannelId, &[u8])> {
    if datagram.len() < CHANNEL_HEADER_SIZE {
        return None;
    }
    let (header, payload) = datagram.split_at(CHANNEL_HEADER_SIZE);
    let channel = ChannelId::from_be_bytes([header[0], header[1], header[2], header[3]]);
    Some((channel, payload))
}

// Wire encoding for the four message types exchanged between test peers.
//
// Every message begins with a 12-byte big-endian header:
//   msg_type: u32, remote_channel: u32, local_channel: u32

use crate::fail::Fail;
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};

pub const HEADER_LEN: usize = 12;
pub const FILLER_BYTE: u8 = 0x7f;

const MSG_INIT: u32 = 1;
const MSG_DATA: u32 = 2;
const MSG_ACK: u32 = 3;

#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub remote_channel: u32,
    pub local_channel: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Init(Header),
    InitAck(Header),
    Data {
        header: Header,
        seq: u32,
        timestamp_us: u64,
        payload: Bytes,
    },
    Ack {
        header: Header,
        ack_from: u32,
        ack_to: u32,
        delays_us: Vec<u64>,
    },
}

impl Message {
    pub fn header(&self) -> &Header {
        match self {
            Message::Init(h) | Message::InitAck(h) => h,
            Message::Data { header, .. } => header,
            Message::Ack { header, .. } => header,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Message::Init(h) | Message::InitAck(h) => {
                buf.reserve(HEADER_LEN);
                put_header(&mut buf, MSG_INIT, h);
            }
            Message::Data {
                header,
                seq,
                timestamp_us,
                payload,
            } => {
                buf.reserve(HEADER_LEN + 4 + 8 + payload.len());
                put_header(&mut buf, MSG_DATA, header);
                buf.put_u32(*seq);
                buf.put_u64(*timestamp_us);
                buf.put_slice(payload);
            }
            Message::Ack {
                header,
                ack_from,
                ack_to,
                delays_us,
            } => {
                buf.reserve(HEADER_LEN + 12 + delays_us.len() * 8);
                put_header(&mut buf, MSG_ACK, header);
                buf.put_u32(*ack_from);
                buf.put_u32(*ack_to);
                buf.put_u32(delays_us.len() as u32);
                for d in delays_us {
                    buf.put_u64(*d);
                }
            }
        }
        buf.freeze()
    }

    /// Decodes a received datagram. `is_init_ack` disambiguates msg_type 1
    /// (shared between INIT and INIT-ACK on the wire) by remote_channel: a
    /// nonzero remote_channel means the sender already knows ours, i.e. this
    /// is an INIT-ACK reply rather than a fresh INIT.
    pub fn decode(data: &[u8]) -> Result<Message, Fail> {
        if data.len() < HEADER_LEN {
            return Err(Fail::Malformed {
                details: "datagram shorter than header",
            });
        }
        let msg_type = BigEndian::read_u32(&data[0..4]);
        let remote_channel = BigEndian::read_u32(&data[4..8]);
        let local_channel = BigEndian::read_u32(&data[8..12]);
        let header = Header {
            remote_channel,
            local_channel,
        };

        match msg_type {
            MSG_INIT => {
                if remote_channel == 0 {
                    Ok(Message::Init(header))
                } else {
                    Ok(Message::InitAck(header))
                }
            }
            MSG_DATA => {
                if data.len() < HEADER_LEN + 4 + 8 {
                    return Err(Fail::Malformed {
                        details: "DATA datagram too short for seq/timestamp",
                    });
                }
                let seq = BigEndian::read_u32(&data[12..16]);
                let timestamp_us = BigEndian::read_u64(&data[16..24]);
                let payload = Bytes::copy_from_slice(&data[24..]);
                Ok(Message::Data {
                    header,
                    seq,
                    timestamp_us,
                    payload,
                })
            }
            MSG_ACK => {
                if data.len() < HEADER_LEN + 12 {
                    return Err(Fail::Malformed {
                        details: "ACK datagram too short for ack range",
                    });
                }
                let ack_from = BigEndian::read_u32(&data[12..16]);
                let ack_to = BigEndian::read_u32(&data[16..20]);
                let n_samples = BigEndian::read_u32(&data[20..24]) as usize;
                let expected_len = HEADER_LEN + 12 + n_samples * 8;
                if data.len() < expected_len {
                    return Err(Fail::Malformed {
                        details: "ACK datagram shorter than declared sample count",
                    });
                }
                let mut delays_us = Vec::with_capacity(n_samples);
                for i in 0..n_samples {
                    let off = 24 + i * 8;
                    delays_us.push(BigEndian::read_u64(&data[off..off + 8]));
                }
                Ok(Message::Ack {
                    header,
                    ack_from,
                    ack_to,
                    delays_us,
                })
            }
            _ => Err(Fail::Malformed {
                details: "unknown message type",
            }),
        }
    }
}

fn put_header(buf: &mut BytesMut, msg_type: u32, header: &Header) {
    buf.put_u32(msg_type);
    buf.put_u32(header.remote_channel);
    buf.put_u32(header.local_channel);
}

pub fn filler_payload(len: usize) -> Bytes {
    Bytes::from(vec![FILLER_BYTE; len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_round_trips() {
        let msg = Message::Init(Header {
            remote_channel: 0,
            local_channel: 42,
        });
        let encoded = msg.encode();
        assert_eq!(encoded.len(), HEADER_LEN);
        assert_eq!(Message::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn init_ack_disambiguated_by_remote_channel() {
        let msg = Message::InitAck(Header {
            remote_channel: 42,
            local_channel: 7,
        });
        let encoded = msg.encode();
        assert_eq!(Message::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn data_round_trips_with_payload() {
        let msg = Message::Data {
            header: Header {
                remote_channel: 7,
                local_channel: 42,
            },
            seq: 5,
            timestamp_us: 123_456_789,
            payload: filler_payload(1024),
        };
        let encoded = msg.encode();
        assert_eq!(encoded.len(), HEADER_LEN + 4 + 8 + 1024);
        assert_eq!(Message::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn ack_round_trips_with_samples() {
        let msg = Message::Ack {
            header: Header {
                remote_channel: 42,
                local_channel: 7,
            },
            ack_from: 5,
            ack_to: 5,
            delays_us: vec![10_500, 11_200],
        };
        let encoded = msg.encode();
        assert_eq!(Message::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn short_datagram_is_malformed() {
        let data = [0u8; 4];
        assert!(Message::decode(&data).is_err());
    }

    #[test]
    fn unknown_type_is_malformed() {
        let mut data = [0u8; 12];
        BigEndian::write_u32(&mut data[0..4], 99);
        assert!(Message::decode(&data).is_err());
    }
}

//! Header, question and answer sections (RFC 1035 section 4.1).

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::name::{decode_name, encode_name};
use super::{TYPE_A, TYPE_AAAA, read_u16, read_u32, take};
use crate::error::{DecodeError, EncodeError};

/// Size of the fixed DNS header.
pub const HEADER_LEN: usize = 12;

/// Smallest possible question: root name, type, class.
const MIN_QUESTION_LEN: usize = 1 + 4;
/// Smallest possible record: root name, type, class, TTL, empty RDATA.
const MIN_ANSWER_LEN: usize = 1 + 10;

/// The fixed 12-byte message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub id: u16,
    /// Opaque QR/opcode/AA/TC/RD/RA/Z/RCODE bitfield.
    pub flags: u16,
    pub questions: u16,
    pub answers: u16,
    pub authorities: u16,
    pub additionals: u16,
}

impl Header {
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        take(buf, 0, HEADER_LEN)?;

        Ok(Self {
            id: read_u16(buf, 0)?,
            flags: read_u16(buf, 2)?,
            questions: read_u16(buf, 4)?,
            answers: read_u16(buf, 6)?,
            authorities: read_u16(buf, 8)?,
            additionals: read_u16(buf, 10)?,
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&self.questions.to_be_bytes());
        buf.extend_from_slice(&self.answers.to_be_bytes());
        buf.extend_from_slice(&self.authorities.to_be_bytes());
        buf.extend_from_slice(&self.additionals.to_be_bytes());
    }

    pub fn rcode(&self) -> u8 {
        (self.flags & 0x000F) as u8
    }
}

/// A question section entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
}

impl Question {
    pub fn new(name: impl Into<String>, qtype: u16, qclass: u16) -> Self {
        Self {
            name: name.into(),
            qtype,
            qclass,
        }
    }

    pub fn decode(buf: &[u8], offset: usize) -> Result<(Self, usize), DecodeError> {
        let (name, pos) = decode_name(buf, offset)?;
        let qtype = read_u16(buf, pos)?;
        let qclass = read_u16(buf, pos + 2)?;

        Ok((
            Self {
                name,
                qtype,
                qclass,
            },
            pos + 4,
        ))
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        encode_name(buf, &self.name)?;
        buf.extend_from_slice(&self.qtype.to_be_bytes());
        buf.extend_from_slice(&self.qclass.to_be_bytes());
        Ok(())
    }
}

/// A resource record from the answer section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub name: String,
    pub rtype: u16,
    pub class: u16,
    /// Seconds the record may be cached.
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

impl Answer {
    pub fn decode(buf: &[u8], offset: usize) -> Result<(Self, usize), DecodeError> {
        let (name, pos) = decode_name(buf, offset)?;
        let rtype = read_u16(buf, pos)?;
        let class = read_u16(buf, pos + 2)?;
        let ttl = read_u32(buf, pos + 4)?;
        let rdlength = read_u16(buf, pos + 8)? as usize;
        let rdata = take(buf, pos + 10, rdlength)?.to_vec();

        Ok((
            Self {
                name,
                rtype,
                class,
                ttl,
                rdata,
            },
            pos + 10 + rdlength,
        ))
    }

    /// Encode the record. `name_ptr` replaces the owner name with a
    /// compression pointer to that offset.
    pub fn encode(&self, buf: &mut Vec<u8>, name_ptr: Option<u16>) -> Result<(), EncodeError> {
        match name_ptr {
            Some(ptr) => buf.extend_from_slice(&(0xC000 | (ptr & 0x3FFF)).to_be_bytes()),
            None => encode_name(buf, &self.name)?,
        }
        buf.extend_from_slice(&self.rtype.to_be_bytes());
        buf.extend_from_slice(&self.class.to_be_bytes());
        buf.extend_from_slice(&self.ttl.to_be_bytes());
        buf.extend_from_slice(&(self.rdata.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.rdata);
        Ok(())
    }

    /// The address carried by an A or AAAA record.
    pub fn address(&self) -> Option<IpAddr> {
        match self.rtype {
            TYPE_A => {
                let octets: [u8; 4] = self.rdata.as_slice().try_into().ok()?;
                Some(IpAddr::V4(Ipv4Addr::from(octets)))
            }
            TYPE_AAAA => {
                let octets: [u8; 16] = self.rdata.as_slice().try_into().ok()?;
                Some(IpAddr::V6(Ipv6Addr::from(octets)))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} class={} type={} ",
            self.name, self.ttl, self.class, self.rtype
        )?;
        match self.address() {
            Some(addr) => write!(f, "{addr}"),
            None => {
                write!(f, "\\# {}", self.rdata.len())?;
                for b in &self.rdata {
                    write!(f, " {b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// A decoded message. Authority and additional sections are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
}

impl Message {
    /// Decode the header, then exactly as many questions and answers as the
    /// header claims.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let header = Header::decode(buf)?;
        let (questions, mut pos) = decode_questions(buf, &header)?;

        let mut answers = Vec::with_capacity(capacity_for(
            header.answers,
            buf.len().saturating_sub(pos),
            MIN_ANSWER_LEN,
        ));
        for _ in 0..header.answers {
            let (answer, next) = Answer::decode(buf, pos)?;
            answers.push(answer);
            pos = next;
        }

        Ok(Self {
            header,
            questions,
            answers,
        })
    }

    /// Decode only the header and question section, as needed for a query.
    pub fn decode_query(buf: &[u8]) -> Result<(Header, Vec<Question>), DecodeError> {
        let header = Header::decode(buf)?;
        let (questions, _) = decode_questions(buf, &header)?;
        Ok((header, questions))
    }

    pub fn first_question(&self) -> Option<&Question> {
        self.questions.first()
    }

    /// Encode to wire format.
    ///
    /// Section counts are taken from the vectors; authority and additional
    /// counts are written as zero. Answers owned by the first question's
    /// name point back at it.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let mut data = Vec::with_capacity(512);

        Header {
            questions: self.questions.len() as u16,
            answers: self.answers.len() as u16,
            authorities: 0,
            additionals: 0,
            ..self.header
        }
        .encode(&mut data);

        for q in &self.questions {
            q.encode(&mut data)?;
        }

        let first = self.questions.first().map(|q| q.name.as_str());
        for a in &self.answers {
            let ptr = (first == Some(a.name.as_str())).then_some(HEADER_LEN as u16);
            a.encode(&mut data, ptr)?;
        }

        Ok(data)
    }
}

fn decode_questions(buf: &[u8], header: &Header) -> Result<(Vec<Question>, usize), DecodeError> {
    let mut pos = HEADER_LEN;
    let mut questions = Vec::with_capacity(capacity_for(
        header.questions,
        buf.len().saturating_sub(pos),
        MIN_QUESTION_LEN,
    ));

    for _ in 0..header.questions {
        let (question, next) = Question::decode(buf, pos)?;
        questions.push(question);
        pos = next;
    }

    Ok((questions, pos))
}

/// Bound a sender-supplied count by how many entries `remaining` bytes
/// could hold.
fn capacity_for(count: u16, remaining: usize, min_len: usize) -> usize {
    (count as usize).min(remaining / min_len)
}

/// Copy `message` with its transaction ID replaced by `id`.
///
/// Returns `None` if the message is too short to carry an ID.
pub fn rewrite_id(message: &[u8], id: u16) -> Option<Vec<u8>> {
    if message.len() < 2 {
        return None;
    }
    let mut rewritten = message.to_vec();
    rewritten[..2].copy_from_slice(&id.to_be_bytes());
    Some(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::CLASS_IN;

    fn a_record(name: &str, ttl: u32, ip: [u8; 4]) -> Answer {
        Answer {
            name: name.to_string(),
            rtype: TYPE_A,
            class: CLASS_IN,
            ttl,
            rdata: ip.to_vec(),
        }
    }

    fn response(id: u16, name: &str, answers: Vec<Answer>) -> Message {
        Message {
            header: Header {
                id,
                flags: 0x8180,
                ..Header::default()
            },
            questions: vec![Question::new(name, TYPE_A, CLASS_IN)],
            answers,
        }
    }

    #[test]
    fn header_decode_reads_six_big_endian_fields() {
        let buf = [
            0x12, 0x34, 0x81, 0x80, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04,
        ];

        let header = Header::decode(&buf).unwrap();

        assert_eq!(
            header,
            Header {
                id: 0x1234,
                flags: 0x8180,
                questions: 1,
                answers: 2,
                authorities: 3,
                additionals: 4,
            }
        );
        assert_eq!(header.rcode(), 0);
        assert_eq!(Header { flags: 0x8183, ..header }.rcode(), 3);
    }

    #[test]
    fn header_decode_rejects_short_buffer() {
        assert!(matches!(
            Header::decode(&[0u8; 11]),
            Err(DecodeError::Truncated { needed: 12, len: 11, .. })
        ));
    }

    #[test]
    fn message_decode_resolves_answer_pointer() {
        let msg = response(7, "example.com", vec![a_record("example.com", 300, [93, 184, 216, 34])]);
        let bytes = msg.to_bytes().unwrap();

        // Answer name is the 2-byte pointer right after the question.
        let question_end = HEADER_LEN + 13 + 4;
        assert_eq!(&bytes[question_end..question_end + 2], &[0xC0, 0x0C]);

        let decoded = Message::decode(&bytes).unwrap();

        let mut expected = msg.clone();
        expected.header.questions = 1;
        expected.header.answers = 1;
        assert_eq!(decoded, expected);
        assert_eq!(decoded.answers[0].name, "example.com");
        assert_eq!(
            decoded.answers[0].address(),
            Some(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)))
        );
    }

    #[test]
    fn message_decode_fails_when_counts_exceed_data() {
        let msg = response(1, "example.com", vec![a_record("example.com", 60, [1, 2, 3, 4])]);
        let mut bytes = msg.to_bytes().unwrap();
        bytes[7] = 2; // ANCOUNT

        assert!(matches!(
            Message::decode(&bytes),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn message_decode_fails_on_truncated_rdata() {
        let msg = response(1, "example.com", vec![a_record("example.com", 60, [1, 2, 3, 4])]);
        let bytes = msg.to_bytes().unwrap();

        assert!(Message::decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn message_decode_ignores_trailing_sections() {
        let msg = response(1, "example.com", vec![a_record("example.com", 60, [1, 2, 3, 4])]);
        let mut bytes = msg.to_bytes().unwrap();
        bytes[11] = 1; // ARCOUNT, with no record present
        bytes.extend_from_slice(&[0xDE, 0xAD]);

        let decoded = Message::decode(&bytes).unwrap();

        assert_eq!(decoded.answers.len(), 1);
        assert_eq!(decoded.header.additionals, 1);
    }

    #[test]
    fn decode_query_reads_questions_only() {
        let mut bytes = Vec::new();
        Header {
            id: 0xBEEF,
            flags: 0x0100,
            questions: 1,
            // An answer count with no answer data is not checked for queries.
            answers: 5,
            ..Header::default()
        }
        .encode(&mut bytes);
        Question::new("example.org", 28, CLASS_IN)
            .encode(&mut bytes)
            .unwrap();

        let (header, questions) = Message::decode_query(&bytes).unwrap();

        assert_eq!(header.id, 0xBEEF);
        assert_eq!(header.flags, 0x0100);
        assert_eq!(questions, vec![Question::new("example.org", 28, CLASS_IN)]);
    }

    #[test]
    fn inflated_counts_do_not_size_buffers() {
        assert_eq!(capacity_for(u16::MAX, 0, MIN_QUESTION_LEN), 0);
        assert_eq!(capacity_for(u16::MAX, 100, MIN_QUESTION_LEN), 20);
        assert_eq!(capacity_for(3, 100, MIN_ANSWER_LEN), 3);

        let mut bytes = Vec::new();
        Header {
            questions: u16::MAX,
            answers: u16::MAX,
            ..Header::default()
        }
        .encode(&mut bytes);

        assert!(matches!(
            Message::decode(&bytes),
            Err(DecodeError::Truncated { offset: HEADER_LEN, .. })
        ));
    }

    #[test]
    fn decode_query_with_no_questions() {
        let mut bytes = Vec::new();
        Header::default().encode(&mut bytes);

        let (_, questions) = Message::decode_query(&bytes).unwrap();

        assert!(questions.is_empty());
    }

    #[test]
    fn answer_display_formats_addresses() {
        let a = a_record("example.com", 300, [10, 0, 0, 1]);
        let aaaa = Answer {
            name: "example.com".into(),
            rtype: TYPE_AAAA,
            class: CLASS_IN,
            ttl: 60,
            rdata: Ipv6Addr::LOCALHOST.octets().to_vec(),
        };
        let txt = Answer {
            name: "example.com".into(),
            rtype: 16,
            class: CLASS_IN,
            ttl: 60,
            rdata: vec![0x02, b'h', b'i'],
        };

        assert_eq!(a.to_string(), "example.com 300 class=1 type=1 10.0.0.1");
        assert_eq!(aaaa.to_string(), "example.com 60 class=1 type=28 ::1");
        assert_eq!(txt.to_string(), "example.com 60 class=1 type=16 \\# 3 02 68 69");
    }

    #[test]
    fn address_requires_exact_rdata_length() {
        let mut a = a_record("example.com", 300, [10, 0, 0, 1]);
        a.rdata.push(0);

        assert_eq!(a.address(), None);
    }

    #[test]
    fn rewrite_id_only_touches_first_two_bytes() {
        let msg = response(0x1234, "example.com", vec![a_record("example.com", 300, [1, 1, 1, 1])]);
        let cached = msg.to_bytes().unwrap();

        let reply = rewrite_id(&cached, 0xABCD).unwrap();

        assert_eq!(&reply[..2], &[0xAB, 0xCD]);
        assert_eq!(&reply[2..], &cached[2..]);
        assert_eq!(rewrite_id(&[0x01], 0xABCD), None);
    }
}

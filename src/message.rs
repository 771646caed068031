//! 프로토콜 메시지 정의
//!
//! 모든 패킷은 사람이 읽을 수 있는 고정 78바이트 ASCII 프레임이다.
//!
//! ```text
//!  0-14   출발지 주소        (좌측 공백 패딩)
//! 15-19   출발지 포트        (좌측 공백 패딩, 0~99999)
//! 20-34   목적지 주소        (좌측 공백 패딩)
//! 35-39   목적지 포트        (좌측 공백 패딩, 0~99999)
//! 40      opcode             (D / A / N / E)
//! 41-42   시퀀스 번호        (좌측 공백 패딩, 0~99)
//! 43-72   페이로드           (우측 공백 패딩)
//! 73-77   체크섬             (좌측 공백 패딩, 0~72 바이트 합)
//! ```

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::ops::Range;

use bytes::Bytes;

use crate::error::CodecError;
use crate::{SequenceNumber, CHECKSUM_SPAN, FRAME_LEN, PAYLOAD_LEN, SEQUENCE_MODULUS};

// 필드 오프셋
const SOURCE_IP: Range<usize> = 0..15;
const SOURCE_PORT: Range<usize> = 15..20;
const DEST_IP: Range<usize> = 20..35;
const DEST_PORT: Range<usize> = 35..40;
const OP_CODE: usize = 40;
const SEQUENCE: Range<usize> = 41..43;
const PAYLOAD: Range<usize> = 43..73;
const CHECKSUM: Range<usize> = 73..78;

/// 메시지 타입
///
/// 값은 와이어 상의 ASCII 문자 코드 그대로다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// 데이터 청크
    Data = b'D',

    /// 긍정 확인응답
    Ack = b'A',

    /// 부정 확인응답
    Nak = b'N',

    /// 스트림 종료
    End = b'E',
}

impl OpCode {
    /// 와이어 문자 코드
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// 문자 코드에서 opcode 해석
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'D' => Some(OpCode::Data),
            b'A' => Some(OpCode::Ack),
            b'N' => Some(OpCode::Nak),
            b'E' => Some(OpCode::End),
            _ => None,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpCode::Data => "DATA",
            OpCode::Ack => "ACK",
            OpCode::Nak => "NAK",
            OpCode::End => "END",
        };
        f.write_str(name)
    }
}

/// 와이어 메시지
///
/// 생성 시점에 프레임으로 인코딩되며 이후 불변이다. 예외는
/// [`Message::set_payload`] 뿐이며, 이 경우에도 프레임은 다시 인코딩되지 않는다.
#[derive(Debug, Clone)]
pub struct Message {
    source_ip: IpAddr,
    source_port: u32,
    dest_ip: IpAddr,
    dest_port: u32,
    op_code: OpCode,
    sequence: SequenceNumber,

    /// 항상 30자로 패딩된 페이로드
    payload: String,

    /// 디코딩 시 트레일러에서 읽은 체크섬
    stored_checksum: Option<u32>,

    /// 인코딩된 프레임
    frame: Bytes,
}

impl Message {
    /// 새 메시지 생성 및 인코딩
    ///
    /// 30자를 넘는 페이로드는 29자로 잘린 뒤 공백 하나로 패딩된다.
    /// 어떤 필드든 고정 폭을 넘으면 [`CodecError::Format`] 을 반환한다.
    pub fn new(
        source_ip: IpAddr,
        source_port: u32,
        dest_ip: IpAddr,
        dest_port: u32,
        op_code: OpCode,
        sequence: SequenceNumber,
        payload: &str,
    ) -> Result<Self, CodecError> {
        let payload = right_padded_payload(payload)?;

        let mut buf = Vec::with_capacity(FRAME_LEN);
        buf.extend_from_slice(left_padded(&source_ip.to_string(), SOURCE_IP.len(), "source_ip")?.as_bytes());
        buf.extend_from_slice(left_padded(&source_port.to_string(), SOURCE_PORT.len(), "source_port")?.as_bytes());
        buf.extend_from_slice(left_padded(&dest_ip.to_string(), DEST_IP.len(), "dest_ip")?.as_bytes());
        buf.extend_from_slice(left_padded(&dest_port.to_string(), DEST_PORT.len(), "dest_port")?.as_bytes());
        buf.push(op_code.as_byte());
        if sequence >= SEQUENCE_MODULUS {
            return Err(CodecError::format(
                "sequence",
                format!("{} is outside 0..{}", sequence, SEQUENCE_MODULUS),
            ));
        }
        buf.extend_from_slice(left_padded(&sequence.to_string(), SEQUENCE.len(), "sequence")?.as_bytes());
        buf.extend_from_slice(payload.as_bytes());
        debug_assert_eq!(buf.len(), CHECKSUM_SPAN);

        let sum = checksum(&buf);
        buf.extend_from_slice(left_padded(&sum.to_string(), CHECKSUM.len(), "checksum")?.as_bytes());

        Ok(Self {
            source_ip,
            source_port,
            dest_ip,
            dest_port,
            op_code,
            sequence,
            payload,
            stored_checksum: None,
            frame: Bytes::from(buf),
        })
    }

    /// 소켓 주소 쌍으로 메시지 생성
    pub fn between(
        source: SocketAddr,
        dest: SocketAddr,
        op_code: OpCode,
        sequence: SequenceNumber,
        payload: &str,
    ) -> Result<Self, CodecError> {
        Self::new(
            source.ip(),
            u32::from(source.port()),
            dest.ip(),
            u32::from(dest.port()),
            op_code,
            sequence,
            payload,
        )
    }

    /// 프레임에서 메시지 복원
    ///
    /// 검증 순서: 길이 → 트레일러 형식 → 체크섬 → 각 필드.
    /// 체크섬을 필드 해석보다 먼저 검사하므로, 앞 73바이트 중 어느 한
    /// 바이트가 바뀌어도 항상 [`CodecError::Checksum`] 으로 보고된다.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != FRAME_LEN {
            return Err(CodecError::format(
                "frame",
                format!("expected {} bytes, got {}", FRAME_LEN, bytes.len()),
            ));
        }

        let stored = parse_decimal::<u32>(bytes, CHECKSUM, "checksum")?;
        let computed = checksum(&bytes[..CHECKSUM_SPAN]);
        if stored != computed {
            return Err(CodecError::Checksum { stored, computed });
        }

        let source_ip = parse_address(bytes, SOURCE_IP, "source_ip")?;
        let source_port = parse_decimal::<u32>(bytes, SOURCE_PORT, "source_port")?;
        let dest_ip = parse_address(bytes, DEST_IP, "dest_ip")?;
        let dest_port = parse_decimal::<u32>(bytes, DEST_PORT, "dest_port")?;
        let op_code = OpCode::from_byte(bytes[OP_CODE]).ok_or_else(|| {
            CodecError::format("op_code", format!("unknown opcode byte {}", bytes[OP_CODE]))
        })?;
        let sequence = parse_decimal::<SequenceNumber>(bytes, SEQUENCE, "sequence")?;
        let payload = ascii_text(bytes, PAYLOAD, "payload")?.to_string();

        Ok(Self {
            source_ip,
            source_port,
            dest_ip,
            dest_port,
            op_code,
            sequence,
            payload,
            stored_checksum: Some(stored),
            frame: Bytes::copy_from_slice(bytes),
        })
    }

    /// 인코딩된 프레임
    pub fn frame(&self) -> &Bytes {
        &self.frame
    }

    pub fn source_ip(&self) -> IpAddr {
        self.source_ip
    }

    pub fn source_port(&self) -> u32 {
        self.source_port
    }

    pub fn dest_ip(&self) -> IpAddr {
        self.dest_ip
    }

    pub fn dest_port(&self) -> u32 {
        self.dest_port
    }

    pub fn op_code(&self) -> OpCode {
        self.op_code
    }

    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// 패딩 포함 30자 페이로드
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// 트레일러 체크섬 (디코딩된 메시지만)
    pub fn stored_checksum(&self) -> Option<u32> {
        self.stored_checksum
    }

    /// 프레임 앞 73바이트의 합
    pub fn computed_checksum(&self) -> u32 {
        checksum(&self.frame[..CHECKSUM_SPAN])
    }

    /// 체크섬 일치 여부
    ///
    /// 직접 인코딩한 메시지는 트레일러가 없으므로 항상 참이다.
    pub fn checksum_valid(&self) -> bool {
        self.stored_checksum
            .map_or(true, |stored| stored == self.computed_checksum())
    }

    /// 프레임을 다시 인코딩하지 않고 페이로드만 교체 (진단용)
    pub fn set_payload(&mut self, payload: impl Into<String>) {
        self.payload = payload.into();
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} {}:{} -> {}:{} [{}]",
            self.op_code,
            self.sequence,
            self.source_ip,
            self.source_port,
            self.dest_ip,
            self.dest_port,
            self.payload.trim_end()
        )
    }
}

/// 가산 체크섬 (각 바이트 값의 합)
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().map(|&b| u32::from(b)).sum()
}

fn left_padded(text: &str, width: usize, field: &'static str) -> Result<String, CodecError> {
    if !text.is_ascii() {
        return Err(CodecError::format(field, "non-ASCII text"));
    }
    if text.len() > width {
        return Err(CodecError::format(
            field,
            format!("{:?} cannot be represented in {} chars", text, width),
        ));
    }
    Ok(format!("{:>width$}", text, width = width))
}

fn right_padded_payload(payload: &str) -> Result<String, CodecError> {
    if !payload.is_ascii() {
        return Err(CodecError::format("payload", "non-ASCII text"));
    }
    if payload.len() > PAYLOAD_LEN {
        // 29자 + 공백
        return Ok(format!("{:<width$}", &payload[..PAYLOAD_LEN - 1], width = PAYLOAD_LEN));
    }
    Ok(format!("{:<width$}", payload, width = PAYLOAD_LEN))
}

fn ascii_text<'a>(bytes: &'a [u8], range: Range<usize>, field: &'static str) -> Result<&'a str, CodecError> {
    let slice = &bytes[range];
    if !slice.is_ascii() {
        return Err(CodecError::format(field, "non-ASCII bytes"));
    }
    std::str::from_utf8(slice).map_err(|e| CodecError::format(field, e.to_string()))
}

fn parse_decimal<T: std::str::FromStr>(
    bytes: &[u8],
    range: Range<usize>,
    field: &'static str,
) -> Result<T, CodecError> {
    let text = ascii_text(bytes, range, field)?.trim();
    text.parse::<T>()
        .map_err(|_| CodecError::format(field, format!("{:?} is not a decimal integer", text)))
}

fn parse_address(bytes: &[u8], range: Range<usize>, field: &'static str) -> Result<IpAddr, CodecError> {
    let text = ascii_text(bytes, range, field)?.trim();
    text.parse::<IpAddr>().map_err(|_| CodecError::Address {
        field,
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCAL: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    fn data(seq: SequenceNumber, payload: &str) -> Message {
        Message::new(LOCAL, 2015, LOCAL, 2017, OpCode::Data, seq, payload).unwrap()
    }

    /// 73자 헤더+페이로드 텍스트에 올바른 체크섬을 붙인 프레임
    fn frame_with_valid_checksum(body: &str) -> Vec<u8> {
        assert_eq!(body.len(), CHECKSUM_SPAN);
        let mut frame = body.as_bytes().to_vec();
        frame.extend_from_slice(format!("{:>5}", checksum(body.as_bytes())).as_bytes());
        frame
    }

    #[test]
    fn test_frame_layout() {
        let msg = data(5, "hello world");
        let frame = msg.frame();

        assert_eq!(frame.len(), FRAME_LEN);
        assert_eq!(&frame[SOURCE_IP], b"      127.0.0.1");
        assert_eq!(&frame[SOURCE_PORT], b" 2015");
        assert_eq!(&frame[DEST_IP], b"      127.0.0.1");
        assert_eq!(&frame[DEST_PORT], b" 2017");
        assert_eq!(frame[OP_CODE], b'D');
        assert_eq!(&frame[SEQUENCE], b" 5");
        assert_eq!(&frame[PAYLOAD], b"hello world                   ");

        let expected = checksum(&frame[..CHECKSUM_SPAN]);
        assert_eq!(&frame[CHECKSUM], format!("{:>5}", expected).as_bytes());
        assert_eq!(msg.computed_checksum(), expected);
    }

    #[test]
    fn test_opcode_character_codes() {
        assert_eq!(OpCode::Data.as_byte(), 68);
        assert_eq!(OpCode::Ack.as_byte(), 65);
        assert_eq!(OpCode::Nak.as_byte(), 78);
        assert_eq!(OpCode::End.as_byte(), 69);
        assert_eq!(OpCode::from_byte(b'X'), None);
    }

    #[test]
    fn test_decode_restores_fields() {
        let msg = Message::new(
            "10.0.0.7".parse().unwrap(),
            99999,
            "192.168.100.200".parse().unwrap(),
            0,
            OpCode::Ack,
            99,
            "payload",
        )
        .unwrap();

        let decoded = Message::decode(msg.frame()).unwrap();

        assert_eq!(decoded.source_ip(), msg.source_ip());
        assert_eq!(decoded.source_port(), 99999);
        assert_eq!(decoded.dest_ip(), msg.dest_ip());
        assert_eq!(decoded.dest_port(), 0);
        assert_eq!(decoded.op_code(), OpCode::Ack);
        assert_eq!(decoded.sequence(), 99);
        assert_eq!(decoded.payload(), msg.payload());
        assert_eq!(decoded.stored_checksum(), Some(msg.computed_checksum()));
        assert_eq!(decoded.computed_checksum(), msg.computed_checksum());
        assert!(decoded.checksum_valid());
    }

    #[test]
    fn test_any_byte_flip_is_checksum_error() {
        let frame = data(42, "the quick brown fox").frame().to_vec();

        for i in 0..CHECKSUM_SPAN {
            let mut corrupted = frame.clone();
            corrupted[i] ^= 0x01;
            match Message::decode(&corrupted) {
                Err(CodecError::Checksum { .. }) => {}
                other => panic!("byte {} flip: expected checksum error, got {:?}", i, other),
            }
        }
    }

    #[test]
    fn test_field_overflow_is_format_error() {
        let port = Message::new(LOCAL, 100_000, LOCAL, 2017, OpCode::Data, 0, "");
        assert!(matches!(port, Err(CodecError::Format { field: "source_port", .. })));

        let seq = Message::new(LOCAL, 2015, LOCAL, 2017, OpCode::Data, 100, "");
        assert!(matches!(seq, Err(CodecError::Format { field: "sequence", .. })));

        let ipv6: IpAddr = "2001:db8:85a3::8a2e:370:7334".parse().unwrap();
        let addr = Message::new(ipv6, 2015, LOCAL, 2017, OpCode::Data, 0, "");
        assert!(matches!(addr, Err(CodecError::Format { field: "source_ip", .. })));
    }

    #[test]
    fn test_payload_padding_and_truncation() {
        assert_eq!(data(0, "").payload(), " ".repeat(30));

        let exact = "x".repeat(30);
        assert_eq!(data(0, &exact).payload(), exact);

        let long = "abcdefghijklmnopqrstuvwxyz0123456789";
        let truncated = data(0, long);
        assert_eq!(truncated.payload(), "abcdefghijklmnopqrstuvwxyz012 ");
        assert_eq!(truncated.frame().len(), FRAME_LEN);
    }

    #[test]
    fn test_non_ascii_payload_rejected() {
        let result = Message::new(LOCAL, 2015, LOCAL, 2017, OpCode::Data, 0, "안녕");
        assert!(matches!(result, Err(CodecError::Format { field: "payload", .. })));
    }

    #[test]
    fn test_wrong_length_is_format_error() {
        let frame = data(1, "abc").frame().to_vec();
        assert!(matches!(
            Message::decode(&frame[..FRAME_LEN - 1]),
            Err(CodecError::Format { field: "frame", .. })
        ));
        assert!(matches!(Message::decode(&[]), Err(CodecError::Format { .. })));
    }

    #[test]
    fn test_bad_trailer_is_format_error() {
        let mut frame = data(1, "abc").frame().to_vec();
        frame[CHECKSUM].copy_from_slice(b"12x45");
        assert!(matches!(
            Message::decode(&frame),
            Err(CodecError::Format { field: "checksum", .. })
        ));
    }

    #[test]
    fn test_unparsable_address_is_address_error() {
        let body = format!(
            "{:>15}{:>5}{:>15}{:>5}D{:>2}{:<30}",
            "not.an.address", 2015, "127.0.0.1", 2017, 3, "data"
        );
        let err = Message::decode(&frame_with_valid_checksum(&body)).unwrap_err();
        assert_eq!(
            err,
            CodecError::Address {
                field: "source_ip",
                text: "not.an.address".into()
            }
        );
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_non_decimal_sequence_is_format_error() {
        let body = format!(
            "{:>15}{:>5}{:>15}{:>5}D{:>2}{:<30}",
            "127.0.0.1", 2015, "127.0.0.1", 2017, "-1", "data"
        );
        assert!(matches!(
            Message::decode(&frame_with_valid_checksum(&body)),
            Err(CodecError::Format { field: "sequence", .. })
        ));
    }

    #[test]
    fn test_unknown_opcode_is_format_error() {
        let body = format!(
            "{:>15}{:>5}{:>15}{:>5}Q{:>2}{:<30}",
            "127.0.0.1", 2015, "127.0.0.1", 2017, 0, ""
        );
        assert!(matches!(
            Message::decode(&frame_with_valid_checksum(&body)),
            Err(CodecError::Format { field: "op_code", .. })
        ));
    }

    #[test]
    fn test_set_payload_keeps_frame() {
        let mut msg = data(7, "original");
        let frame = msg.frame().clone();

        msg.set_payload("replaced");

        assert_eq!(msg.payload(), "replaced");
        assert_eq!(msg.frame(), &frame);
        assert_eq!(Message::decode(msg.frame()).unwrap().payload().trim_end(), "original");
    }
}

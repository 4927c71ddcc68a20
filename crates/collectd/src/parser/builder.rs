//! 패킷 빌더 -- collectd 바이너리 패킷을 인코딩합니다.
//!
//! 테스트, 벤치마크, 퍼징 시드 생성에 사용합니다.

use bytes::{BufMut, BytesMut};
use ring::rand::{SecureRandom, SystemRandom};

use super::{
    PART_HEADER_LEN, TYPE_HOST, TYPE_INTERVAL, TYPE_INTERVAL_HIRES, TYPE_PLUGIN,
    TYPE_PLUGIN_INSTANCE, TYPE_TIME, TYPE_TIME_HIRES, TYPE_TYPE, TYPE_TYPE_INSTANCE, TYPE_VALUES,
};
use crate::error::CollectdError;
use crate::security::{encrypt_packet, sign_packet};
use crate::types::Value;

/// 고해상도 시각 배율 (2^30)
const HIRES_FACTOR: f64 = (1u64 << 30) as f64;

/// collectd 패킷 빌더
///
/// 파트는 호출 순서대로 기록됩니다.
///
/// # 사용 예시
/// ```ignore
/// let packet = PacketBuilder::new()
///     .host("h1")
///     .time(10)
///     .plugin("cpu")
///     .plugin_instance("0")
///     .type_name("cpu")
///     .type_instance("user")
///     .values(&[Value::Derive(100)])
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct PacketBuilder {
    buf: BytesMut,
}

impl PacketBuilder {
    /// 빈 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 임의의 파트를 추가합니다.
    ///
    /// 페이로드가 u16 길이를 넘으면 길이 필드는 `u16::MAX`로 고정됩니다.
    pub fn part(mut self, part_type: u16, payload: &[u8]) -> Self {
        let len = u16::try_from(payload.len() + PART_HEADER_LEN).unwrap_or(u16::MAX);
        self.buf.put_u16(part_type);
        self.buf.put_u16(len);
        self.buf.put_slice(payload);
        self
    }

    fn string(self, part_type: u16, value: &str) -> Self {
        let mut payload = Vec::with_capacity(value.len() + 1);
        payload.extend_from_slice(value.as_bytes());
        payload.push(0);
        self.part(part_type, &payload)
    }

    /// host 파트
    pub fn host(self, host: &str) -> Self {
        self.string(TYPE_HOST, host)
    }

    /// time 파트 (초)
    pub fn time(self, secs: u64) -> Self {
        self.part(TYPE_TIME, &secs.to_be_bytes())
    }

    /// time_hires 파트 (초, 2^-30 단위로 인코딩)
    pub fn time_hires(self, secs: f64) -> Self {
        self.part(TYPE_TIME_HIRES, &((secs * HIRES_FACTOR) as u64).to_be_bytes())
    }

    /// interval 파트 (초)
    pub fn interval(self, secs: u64) -> Self {
        self.part(TYPE_INTERVAL, &secs.to_be_bytes())
    }

    /// interval_hires 파트
    pub fn interval_hires(self, secs: f64) -> Self {
        self.part(
            TYPE_INTERVAL_HIRES,
            &((secs * HIRES_FACTOR) as u64).to_be_bytes(),
        )
    }

    /// plugin 파트
    pub fn plugin(self, plugin: &str) -> Self {
        self.string(TYPE_PLUGIN, plugin)
    }

    /// plugin_instance 파트
    pub fn plugin_instance(self, instance: &str) -> Self {
        self.string(TYPE_PLUGIN_INSTANCE, instance)
    }

    /// type 파트
    pub fn type_name(self, type_name: &str) -> Self {
        self.string(TYPE_TYPE, type_name)
    }

    /// type_instance 파트
    pub fn type_instance(self, instance: &str) -> Self {
        self.string(TYPE_TYPE_INSTANCE, instance)
    }

    /// values 파트. 각 값의 종류가 와이어 타입 바이트가 됩니다.
    pub fn values(self, values: &[Value]) -> Self {
        let count = u16::try_from(values.len()).unwrap_or(u16::MAX);
        let mut payload = BytesMut::with_capacity(2 + 9 * values.len());
        payload.put_u16(count);
        for value in values {
            payload.put_u8(value.kind().wire_code());
        }
        for value in values {
            payload.put_slice(&value.encode());
        }
        self.part(TYPE_VALUES, &payload)
    }

    /// 평문 패킷을 반환합니다.
    pub fn build(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    /// HMAC-SHA256 서명 파트를 앞에 붙인 패킷을 반환합니다.
    pub fn build_signed(self, user: &str, password: &str) -> Result<Vec<u8>, CollectdError> {
        sign_packet(user, password, &self.buf)
    }

    /// 무작위 IV로 암호화한 패킷을 반환합니다.
    pub fn build_encrypted(self, user: &str, password: &str) -> Result<Vec<u8>, CollectdError> {
        let mut iv = [0u8; 16];
        SystemRandom::new()
            .fill(&mut iv)
            .map_err(|_| CollectdError::protocol("failed to generate IV"))?;
        encrypt_packet(user, password, iv, &self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_part_layout() {
        let packet = PacketBuilder::new().host("h1").build();
        assert_eq!(packet, [0x00, 0x00, 0x00, 0x07, b'h', b'1', 0x00]);
    }

    #[test]
    fn values_part_layout() {
        let packet = PacketBuilder::new()
            .values(&[Value::Counter(1), Value::Gauge(1.0)])
            .build();
        // header(4) + count(2) + kinds(2) + values(16)
        assert_eq!(packet.len(), 24);
        assert_eq!(&packet[..4], &[0x00, 0x06, 0x00, 24]);
        assert_eq!(&packet[4..8], &[0x00, 0x02, 0x00, 0x01]);
        assert_eq!(&packet[8..16], &1u64.to_be_bytes());
        assert_eq!(&packet[16..24], &1.0f64.to_le_bytes());
    }

    #[test]
    fn encrypted_packets_use_fresh_iv() {
        let a = PacketBuilder::new().host("h1").build_encrypted("u", "p").unwrap();
        let b = PacketBuilder::new().host("h1").build_encrypted("u", "p").unwrap();
        assert_eq!(a.len(), b.len());
        assert_ne!(a, b);
    }
}

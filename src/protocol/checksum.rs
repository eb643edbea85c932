//! Frame integrity values for both protocol versions

/// CRC-8/DVB-S2 polynomial used by v2 frames
pub const CRC8_DVB_S2_POLY: u8 = 0xD5;

/// Feed one byte into a CRC-8/DVB-S2 accumulator
pub fn crc8_dvb_s2(crc: u8, byte: u8) -> u8 {
    let mut crc = crc ^ byte;
    for _ in 0..8 {
        crc = if crc & 0x80 != 0 {
            (crc << 1) ^ CRC8_DVB_S2_POLY
        } else {
            crc << 1
        };
    }
    crc
}

/// CRC-8/DVB-S2 over a byte slice, seeded at 0
pub fn crc8_dvb_s2_slice(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |crc, &b| crc8_dvb_s2(crc, b))
}

/// XOR of all bytes, the v1 checksum
pub fn xor_slice(seed: u8, bytes: &[u8]) -> u8 {
    bytes.iter().fold(seed, |acc, &b| acc ^ b)
}

/// Running integrity value, selected by frame version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checksum {
    Xor(u8),
    Crc8(u8),
}

impl Checksum {
    pub fn xor() -> Self {
        Checksum::Xor(0)
    }

    pub fn crc8() -> Self {
        Checksum::Crc8(0)
    }

    pub fn update(&mut self, byte: u8) {
        match self {
            Checksum::Xor(acc) => *acc ^= byte,
            Checksum::Crc8(acc) => *acc = crc8_dvb_s2(*acc, byte),
        }
    }

    pub fn value(&self) -> u8 {
        match *self {
            Checksum::Xor(acc) | Checksum::Crc8(acc) => acc,
        }
    }
}

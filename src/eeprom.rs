// eeprom.rs

use std::fmt;

use crc::{Crc, CRC_32_ISCSI};

use crate::layout::EEPROM_SIZE;

pub const ERASED: u8 = 0xFF;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EepromError {
    OutOfRange { addr: usize, len: usize },
    Backend(String),
}

impl fmt::Display for EepromError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EepromError::OutOfRange { addr, len } => {
                write!(f, "access of {len} bytes at {addr} is out of range")
            }
            EepromError::Backend(e) => write!(f, "storage backend error: {e}"),
        }
    }
}

impl std::error::Error for EepromError {}

/// EEPROM-like storage: random access reads and writes into a RAM image,
/// made persistent by `commit()`.
pub trait Eeprom {
    fn capacity(&self) -> usize;

    fn read(&self, addr: usize, buf: &mut [u8]) -> Result<(), EepromError>;

    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), EepromError>;

    fn commit(&mut self) -> Result<(), EepromError>;

    fn read_byte(&self, addr: usize) -> Result<u8, EepromError> {
        let mut b = [0u8; 1];
        self.read(addr, &mut b)?;
        Ok(b[0])
    }

    fn write_byte(&mut self, addr: usize, value: u8) -> Result<(), EepromError> {
        self.write(addr, &[value])
    }
}

impl<E: Eeprom + ?Sized> Eeprom for Box<E> {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn read(&self, addr: usize, buf: &mut [u8]) -> Result<(), EepromError> {
        (**self).read(addr, buf)
    }

    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), EepromError> {
        (**self).write(addr, data)
    }

    fn commit(&mut self) -> Result<(), EepromError> {
        (**self).commit()
    }
}

pub(crate) fn check_range(capacity: usize, addr: usize, len: usize) -> Result<(), EepromError> {
    match addr.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(EepromError::OutOfRange { addr, len }),
    }
}

#[derive(Clone, Debug)]
pub struct MemEeprom {
    image: Vec<u8>,
    commits: usize,
}

impl MemEeprom {
    pub fn new(capacity: usize) -> Self {
        Self {
            image: vec![ERASED; capacity],
            commits: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.image
    }

    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl Default for MemEeprom {
    fn default() -> Self {
        Self::new(EEPROM_SIZE)
    }
}

impl Eeprom for MemEeprom {
    fn capacity(&self) -> usize {
        self.image.len()
    }

    fn read(&self, addr: usize, buf: &mut [u8]) -> Result<(), EepromError> {
        check_range(self.image.len(), addr, buf.len())?;
        buf.copy_from_slice(&self.image[addr..addr + buf.len()]);
        Ok(())
    }

    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), EepromError> {
        check_range(self.image.len(), addr, data.len())?;
        self.image[addr..addr + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), EepromError> {
        self.commits += 1;
        Ok(())
    }
}

const IMAGE_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

pub const CRC_LEN: usize = 4;

pub fn frame_image(image: &[u8]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(image.len() + CRC_LEN);
    blob.extend_from_slice(image);
    blob.extend_from_slice(&IMAGE_CRC.checksum(image).to_le_bytes());
    blob
}

pub fn unframe_image(blob: &[u8]) -> Option<&[u8]> {
    if blob.len() < CRC_LEN {
        return None;
    }
    let (image, trailer) = blob.split_at(blob.len() - CRC_LEN);
    let stored = u32::from_le_bytes(trailer.try_into().ok()?);
    (IMAGE_CRC.checksum(image) == stored).then_some(image)
}


// EOF

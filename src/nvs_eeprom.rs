// nvs_eeprom.rs

use esp_idf_svc::nvs;
use log::*;

use crate::{eeprom::check_range, *};

const EEPROM_KEY: &str = "eeprom";

/// EEPROM emulation on top of one NVS blob.
pub struct NvsEeprom {
    nvs: nvs::EspNvs<nvs::NvsDefault>,
    image: Vec<u8>,
}

impl NvsEeprom {
    pub fn open(nvs: nvs::EspNvs<nvs::NvsDefault>) -> Self {
        let mut image = vec![ERASED; EEPROM_SIZE];
        let mut nvsbuf = vec![0u8; EEPROM_SIZE + CRC_LEN];
        info!("Reading up to {sz} bytes from nvs...", sz = nvsbuf.len());

        match nvs.get_raw(EEPROM_KEY, &mut nvsbuf) {
            Err(e) => error!("Nvs read error {e:?}"),
            Ok(None) => error!("Nvs key not found"),
            Ok(Some(b)) => match unframe_image(b) {
                Some(img) if img.len() == EEPROM_SIZE => {
                    info!("Got {sz} bytes of eeprom image from nvs.", sz = img.len());
                    image.copy_from_slice(img);
                }
                Some(img) => error!("Eeprom image has wrong size {sz}", sz = img.len()),
                None => error!("Eeprom image checksum mismatch"),
            },
        }

        Self { nvs, image }
    }
}

impl Eeprom for NvsEeprom {
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
        let nvsdata = frame_image(&self.image);
        info!("Saving {sz} bytes of eeprom image to nvs...", sz = nvsdata.len());
        self.nvs
            .set_raw(EEPROM_KEY, &nvsdata)
            .map(|_| ())
            .map_err(|e| EepromError::Backend(format!("Cannot save to nvs: {e:?}")))
    }
}

// EOF

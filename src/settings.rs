//! Persistent system settings in internal flash.
//!
//! Holds the network-config flag toggled by the Disc6 double press.
//! Stored as a single key in a `sequential-storage` map over the last
//! flash pages; the map layer handles wear levelling and GC.

use bt2cdc::config::{SETTINGS_FLASH_PAGE_COUNT, SETTINGS_FLASH_PAGE_START};
use bt2cdc::Error;
use defmt::{error, info};

/// Flash page size for nRF52840 (4 KB).
const FLASH_PAGE_SIZE: u32 = 4096;

const SETTINGS_START: u32 = SETTINGS_FLASH_PAGE_START * FLASH_PAGE_SIZE;
const SETTINGS_END: u32 = (SETTINGS_FLASH_PAGE_START + SETTINGS_FLASH_PAGE_COUNT) * FLASH_PAGE_SIZE;

const KEY_NETWORK_CONFIG: u8 = 0x01;

const BUF_SIZE: usize = 32;

/// System settings cached in RAM, synced with flash on change.
pub struct SystemSettings {
    pub network_config_on: bool,
}

impl SystemSettings {
    pub const fn new() -> Self {
        // Network config defaults to enabled on a fresh device.
        Self {
            network_config_on: true,
        }
    }

    pub async fn load_from_flash(
        &mut self,
        flash: &mut impl embedded_storage_async::nor_flash::NorFlash,
    ) -> Result<(), Error> {
        let mut buf = [0u8; BUF_SIZE];

        match sequential_storage::map::fetch_item::<u8, u8, _>(
            flash,
            SETTINGS_START..SETTINGS_END,
            &mut sequential_storage::cache::NoCache::new(),
            &mut buf,
            &KEY_NETWORK_CONFIG,
        )
        .await
        {
            Ok(Some(value)) => {
                self.network_config_on = value != 0;
                info!("Settings: network config {}", self.network_config_on);
                Ok(())
            }
            Ok(None) => {
                info!("Settings: none stored, using defaults");
                Ok(())
            }
            Err(e) => {
                error!("Settings read error: {:?}", defmt::Debug2Format(&e));
                Err(Error::Storage)
            }
        }
    }

    pub async fn save_to_flash(
        &self,
        flash: &mut impl embedded_storage_async::nor_flash::NorFlash,
    ) -> Result<(), Error> {
        let mut buf = [0u8; BUF_SIZE];
        let value: u8 = self.network_config_on.into();

        match sequential_storage::map::store_item::<u8, u8, _>(
            flash,
            SETTINGS_START..SETTINGS_END,
            &mut sequential_storage::cache::NoCache::new(),
            &mut buf,
            &KEY_NETWORK_CONFIG,
            &value,
        )
        .await
        {
            Ok(()) => {
                info!("Settings saved: network config {}", self.network_config_on);
                Ok(())
            }
            Err(e) => {
                error!("Settings write error: {:?}", defmt::Debug2Format(&e));
                Err(Error::Storage)
            }
        }
    }
}

//! Subsystem ids.
//!
//! The low five bits of the command header name the functional area of the
//! coprocessor a command belongs to. Ids without a name are still valid on the
//! wire and are reported as `RESERVED`.

use std::fmt;
use std::str::FromStr;

/// A 5-bit subsystem id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subsystem(u8);

impl Subsystem {
    /// Mask applied to the command header to extract the subsystem.
    pub const MASK: u8 = 0x1F;

    pub const RES0: Subsystem = Subsystem(0);
    pub const SYS: Subsystem = Subsystem(1);
    pub const MAC: Subsystem = Subsystem(2);
    pub const NWK: Subsystem = Subsystem(3);
    pub const AF: Subsystem = Subsystem(4);
    pub const ZDO: Subsystem = Subsystem(5);
    pub const SAPI: Subsystem = Subsystem(6);
    pub const UTIL: Subsystem = Subsystem(7);
    pub const DBG: Subsystem = Subsystem(8);
    pub const APP: Subsystem = Subsystem(9);
    pub const RCAF: Subsystem = Subsystem(10);
    pub const RCN: Subsystem = Subsystem(11);
    pub const RCN_CLIENT: Subsystem = Subsystem(12);
    pub const BOOT: Subsystem = Subsystem(13);
    pub const ZIPTEST: Subsystem = Subsystem(14);
    pub const DEBUG: Subsystem = Subsystem(15);
    pub const PERIPHERALS: Subsystem = Subsystem(16);
    pub const NFC: Subsystem = Subsystem(17);
    pub const PB_NWK_MGR: Subsystem = Subsystem(18);
    pub const PB_GW: Subsystem = Subsystem(19);
    pub const PB_OTA_MGR: Subsystem = Subsystem(20);
    pub const BLE_SPNP: Subsystem = Subsystem(21);
    pub const BLE_HCI: Subsystem = Subsystem(22);
    pub const SRV_CTR: Subsystem = Subsystem(31);

    const NAMED: [Subsystem; 24] = [
        Self::RES0,
        Self::SYS,
        Self::MAC,
        Self::NWK,
        Self::AF,
        Self::ZDO,
        Self::SAPI,
        Self::UTIL,
        Self::DBG,
        Self::APP,
        Self::RCAF,
        Self::RCN,
        Self::RCN_CLIENT,
        Self::BOOT,
        Self::ZIPTEST,
        Self::DEBUG,
        Self::PERIPHERALS,
        Self::NFC,
        Self::PB_NWK_MGR,
        Self::PB_GW,
        Self::PB_OTA_MGR,
        Self::BLE_SPNP,
        Self::BLE_HCI,
        Self::SRV_CTR,
    ];

    /// Build a subsystem from the low five bits of `value`.
    pub const fn new(value: u8) -> Self {
        Subsystem(value & Self::MASK)
    }

    /// Raw 5-bit id.
    pub const fn id(self) -> u8 {
        self.0
    }

    /// Returns a human-readable name for the subsystem.
    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "RES0",
            1 => "SYS",
            2 => "MAC",
            3 => "NWK",
            4 => "AF",
            5 => "ZDO",
            6 => "SAPI",
            7 => "UTIL",
            8 => "DBG",
            9 => "APP",
            10 => "RCAF",
            11 => "RCN",
            12 => "RCN_CLIENT",
            13 => "BOOT",
            14 => "ZIPTEST",
            15 => "DEBUG",
            16 => "PERIPHERALS",
            17 => "NFC",
            18 => "PB_NWK_MGR",
            19 => "PB_GW",
            20 => "PB_OTA_MGR",
            21 => "BLE_SPNP",
            22 => "BLE_HCI",
            31 => "SRV_CTR",
            _ => "RESERVED",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Subsystem {
    type Err = String;

    /// Accepts a subsystem name (`ZDO`, `sys`) or a number (`5`, `0x05`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let numeric = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u8::from_str_radix(hex, 16).ok(),
            None => trimmed.parse::<u8>().ok(),
        };
        if let Some(value) = numeric {
            if value > Self::MASK {
                return Err(format!("subsystem id {value} out of range (max 31)"));
            }
            return Ok(Subsystem(value));
        }

        let upper = trimmed.to_ascii_uppercase();
        Self::NAMED
            .iter()
            .copied()
            .find(|sub| sub.name() == upper)
            .ok_or_else(|| format!("unknown subsystem '{s}'"))
    }
}

//! Device family profiles.
//!
//! The RR family speaks the same command set as Shtrih; what differs is
//! the ribbon width and a couple of vendor-table coordinates. A family is
//! therefore a profile record consulted by the request codec, not a
//! separate driver.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
  /// Family name, as persisted in the SMART device mapping.
  pub dev_type: &'static str,

  /// Ribbon width in characters.
  pub check_width: usize,

  /// Vendor-table field holding the autocut setting (table 1, row 1).
  pub autocut_field: u8,
}

pub const SHTRIH: DeviceProfile = DeviceProfile {
  dev_type: "Shtrih",
  check_width: 38,
  autocut_field: 0x08,
};

pub const RR: DeviceProfile = DeviceProfile {
  dev_type: "RR",
  check_width: 48,
  autocut_field: 0x07,
};

impl DeviceProfile {
  pub fn from_name(name: &str) -> Option<&'static DeviceProfile> {
    match name.to_lowercase().as_str() {
      "shtrih" => Some(&SHTRIH),
      "rr" => Some(&RR),
      _ => None,
    }
  }
}

//! `lspci -vvv` device listings.
//!
//! Unlike the metric parsers, this one yields a device model: lspci
//! properties are free text, not measurements.
//!
//! ```text
//! 00:1f.2 SATA controller: Intel Corporation C600/X79 series chipset
//!     Subsystem: Dell Device 04f8
//!     Capabilities: [80] MSI: Enable+ Count=1/1 Maskable- 64bit-
//!         Address: fee00000  Data: 0000
//!     Kernel driver in use: ahci
//! ```

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::{debug, trace};

use crate::error::ParseError;
use crate::parser::require_text;
use crate::tokenizer::{classify, Line, LineRole};

pub const FORMAT: &str = "lspci";

/// String map that keeps keys in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyMap {
    entries: Vec<(String, String)>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a property. A repeated key keeps its first position and takes
    /// the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Serialize for PropertyMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// A capability block of a device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Capability {
    /// Name after the bracketed offset, e.g. `MSI: Enable+ Count=1/1`
    pub name: String,
    /// Properties listed under the capability
    pub properties: PropertyMap,
}

/// One PCI device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Device {
    /// Bus address, e.g. `0000:3b:00.0`
    pub address: String,
    /// Class and vendor description following the address
    pub name: String,
    /// Device-level properties
    pub properties: PropertyMap,
    /// Capability blocks in listing order
    pub capabilities: Vec<Capability>,
}

impl Device {
    /// The first capability whose name starts with `prefix`.
    pub fn capability(&self, prefix: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.name.starts_with(prefix))
    }
}

/// `00:1f.2 SATA controller: ...` and `0000:3b:00.0 ...` open a device.
fn device_header(text: &str) -> Option<Device> {
    let (address, name) = text.split_once(char::is_whitespace)?;
    if !(address.contains(':') && address.contains('.')) {
        return None;
    }
    Some(Device {
        address: address.to_string(),
        name: name.trim().to_string(),
        ..Device::default()
    })
}

enum ScanState {
    SeekDevice,
    InDevice(Device),
    InCapability(Device, Capability),
}

impl ScanState {
    /// The device being built, with any open capability attached.
    fn finish(self) -> Option<Device> {
        match self {
            ScanState::SeekDevice => None,
            ScanState::InDevice(device) => Some(device),
            ScanState::InCapability(mut device, capability) => {
                device.capabilities.push(capability);
                Some(device)
            }
        }
    }
}

fn step(state: ScanState, line: &Line<'_>, devices: &mut Vec<Device>) -> ScanState {
    match classify(line) {
        LineRole::Blank => {
            devices.extend(state.finish());
            ScanState::SeekDevice
        }
        LineRole::Separator => state,
        LineRole::Header(text) => match device_header(text) {
            Some(device) => {
                devices.extend(state.finish());
                ScanState::InDevice(device)
            }
            None => {
                trace!(line = text, "ignoring unindented line");
                state
            }
        },
        LineRole::Capability { name } => match state.finish() {
            Some(device) => ScanState::InCapability(
                device,
                Capability {
                    name: name.to_string(),
                    properties: PropertyMap::new(),
                },
            ),
            None => ScanState::SeekDevice,
        },
        LineRole::Property { key, value } => add_property(state, line.depth(), key, value),
        LineRole::Text(text) => add_property(state, line.depth(), text, ""),
    }
}

/// Depth 1 belongs to the device and closes any open capability; deeper
/// lines belong to the open capability.
fn add_property(state: ScanState, depth: usize, key: &str, value: &str) -> ScanState {
    match state {
        ScanState::SeekDevice => ScanState::SeekDevice,
        ScanState::InCapability(device, mut capability) if depth > 1 => {
            capability.properties.insert(key, value);
            ScanState::InCapability(device, capability)
        }
        ScanState::InCapability(mut device, capability) => {
            device.capabilities.push(capability);
            device.properties.insert(key, value);
            ScanState::InDevice(device)
        }
        ScanState::InDevice(mut device) => {
            device.properties.insert(key, value);
            ScanState::InDevice(device)
        }
    }
}

/// Parser for `lspci -vvv` output.
#[derive(Clone, Copy, Debug, Default)]
pub struct LspciParser;

impl LspciParser {
    /// Parse every device of the listing, in order.
    ///
    /// # Errors
    ///
    /// [`ParseError::InvalidArgument`] for empty text and
    /// [`ParseError::MissingSection`] when no device header is found.
    pub fn parse(&self, raw: &str) -> Result<Vec<Device>, ParseError> {
        let raw = require_text(raw)?;

        let mut devices = Vec::new();
        let mut state = ScanState::SeekDevice;
        for line in raw.lines() {
            state = step(state, &Line::new(line), &mut devices);
        }
        devices.extend(state.finish());

        if devices.is_empty() {
            return Err(ParseError::MissingSection {
                format: FORMAT,
                section: "device header",
            });
        }
        debug!(devices = devices.len(), "parsed lspci listing");
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
00:00.0 Host bridge: Intel Corporation Xeon E7 v4/Xeon E5 v4/Xeon E3 v4/Xeon D DMI2 (rev 01)
\tSubsystem: Intel Corporation Device 0000
\tControl: I/O- Mem- BusMaster- SpecCycle- MemWINV- VGASnoop- ParErr- Stepping- SERR- FastB2B- DisINTx-
\tCapabilities: [90] Express (v2) Root Port (Slot-), MSI 00
\t\tDevCap:\tMaxPayload 128 bytes, PhantFunc 0
\t\t\tExtTag- RBE+
\t\tLnkCap:\tPort #0, Speed 2.5GT/s, Width x4, ASPM L1, Exit Latency L1 <16us
\tCapabilities: [e0] Power Management version 3
\t\tFlags: PMEClk- DSI- D1- D2- AuxCurrent=0mA
\tKernel driver in use: pcieport

00:1f.2 SATA controller: Intel Corporation C600/X79 series chipset 6-Port SATA AHCI Controller
\tSubsystem: Dell Device 04f8
\tCapabilities: <access denied>
";

    #[test]
    fn devices_and_capabilities() {
        let devices = LspciParser.parse(LISTING).unwrap();
        assert_eq!(devices.len(), 2);

        let bridge = &devices[0];
        assert_eq!(bridge.address, "00:00.0");
        assert!(bridge.name.starts_with("Host bridge: Intel"));
        assert_eq!(bridge.properties.get("Subsystem"), Some("Intel Corporation Device 0000"));
        assert_eq!(bridge.properties.get("Kernel driver in use"), Some("pcieport"));
        assert_eq!(bridge.capabilities.len(), 2);

        let express = bridge.capability("Express").unwrap();
        assert_eq!(
            express.properties.get("LnkCap"),
            Some("Port #0, Speed 2.5GT/s, Width x4, ASPM L1, Exit Latency L1 <16us")
        );
        assert_eq!(express.properties.get("ExtTag- RBE+"), Some(""));

        let pm = bridge.capability("Power Management").unwrap();
        assert_eq!(pm.properties.len(), 1);

        let sata = &devices[1];
        assert_eq!(sata.capabilities[0].name, "<access denied>");
        assert!(sata.capabilities[0].properties.is_empty());
    }

    #[test]
    fn properties_keep_listing_order() {
        let devices = LspciParser.parse(LISTING).unwrap();
        let keys: Vec<_> = devices[0].properties.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["Subsystem", "Control", "Kernel driver in use"]);
    }

    #[test]
    fn serializes_properties_in_order() {
        let mut map = PropertyMap::new();
        map.insert("b", "1");
        map.insert("a", "2");
        map.insert("b", "3");
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"b":"3","a":"2"}"#);
    }

    #[test]
    fn listing_without_devices_is_an_error() {
        let err = LspciParser.parse("\tSubsystem: Dell\n").unwrap_err();
        assert!(matches!(err, ParseError::MissingSection { format: "lspci", .. }));
        assert!(matches!(LspciParser.parse(""), Err(ParseError::InvalidArgument(_))));
    }
}

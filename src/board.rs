//! QuickFeather board description
//!
//! Static pin catalog and connector map for the QuickLogic QuickFeather
//! (EOS S3). Consumed by the pin-constraint side of the toolchain and exposed
//! read-only through the `board_info` / `connector_pin` tools.

use serde::Serialize;
use std::fmt;

/// Pin direction as seen from the FPGA fabric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    #[serde(rename = "i")]
    Input,
    #[serde(rename = "o")]
    Output,
    #[serde(rename = "io")]
    InOut,
}

/// A single device pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pin {
    pub pin: &'static str,
    pub dir: Direction,
}

/// Named member of a multi-pin resource (e.g. `uart.tx`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Subsignal {
    pub name: &'static str,
    pub pin: &'static str,
    pub dir: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Signals {
    Pin(Pin),
    Subsignals(&'static [Subsignal]),
}

/// An electrical resource on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub name: &'static str,
    pub number: u32,
    pub signals: Signals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_hz: Option<u64>,
}

impl Resource {
    /// Look up one subsignal by name
    pub fn subsignal(&self, name: &str) -> Option<&'static Subsignal> {
        match self.signals {
            Signals::Subsignals(subs) => subs.iter().find(|s| s.name == name),
            Signals::Pin(_) => None,
        }
    }

    /// Every device pin this resource occupies
    pub fn device_pins(&self) -> Vec<&'static str> {
        match self.signals {
            Signals::Pin(p) => vec![p.pin],
            Signals::Subsignals(subs) => subs.iter().map(|s| s.pin).collect(),
        }
    }
}

/// A physical connector. `pins` lists device pins by position, starting at 1;
/// `-` marks a position that is not wired to the FPGA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Connector {
    pub name: &'static str,
    pub number: u32,
    pub pins: &'static str,
}

impl Connector {
    /// Connector designator, e.g. `J2`
    pub fn designator(&self) -> String {
        format!("{}{}", self.name, self.number)
    }

    /// Number of positions, wired or not
    pub fn len(&self) -> usize {
        self.pins.split_whitespace().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Device pin at a 1-based position
    pub fn pin(&self, index: usize) -> Option<&'static str> {
        let pins: &'static str = self.pins;
        index
            .checked_sub(1)
            .and_then(|i| pins.split_whitespace().nth(i))
            .filter(|p| *p != "-")
    }

    /// Wired positions as `(position, device pin)`
    pub fn wired(&self) -> impl Iterator<Item = (usize, &'static str)> {
        let pins: &'static str = self.pins;
        pins.split_whitespace()
            .enumerate()
            .filter(|(_, p)| *p != "-")
            .map(|(i, p)| (i + 1, p))
    }
}

/// Complete board description
#[derive(Debug, Serialize)]
pub struct Board {
    pub name: &'static str,
    pub device: &'static str,
    pub package: &'static str,
    pub default_clock: &'static str,
    pub resources: &'static [Resource],
    pub connectors: &'static [Connector],
}

impl Board {
    pub fn resource(&self, name: &str, number: u32) -> Option<&'static Resource> {
        let resources: &'static [Resource] = self.resources;
        resources.iter().find(|r| r.name == name && r.number == number)
    }

    pub fn connector(&self, name: &str, number: u32) -> Option<&'static Connector> {
        let connectors: &'static [Connector] = self.connectors;
        connectors.iter().find(|c| c.name == name && c.number == number)
    }

    /// Resolve a designator like `J3` plus a 1-based position to a device pin
    pub fn resolve_connector_pin(&self, designator: &str, index: usize) -> Option<&'static str> {
        let split = designator.find(|c: char| c.is_ascii_digit())?;
        let (name, number) = designator.split_at(split);
        let number = number.parse().ok()?;
        self.connector(name, number)?.pin(index)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}, package {})", self.name, self.device, self.package)?;
        writeln!(f, "Default clock: {}", self.default_clock)?;
        writeln!(f, "Resources:")?;
        for r in self.resources {
            write!(f, "  {}#{}:", r.name, r.number)?;
            match r.signals {
                Signals::Pin(p) => write!(f, " pin {} ({:?})", p.pin, p.dir)?,
                Signals::Subsignals(subs) => {
                    for s in subs {
                        write!(f, " {}={}", s.name, s.pin)?;
                    }
                }
            }
            if let Some(hz) = r.clock_hz {
                write!(f, " @ {} Hz", hz)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "Connectors:")?;
        for c in self.connectors {
            let wired: Vec<String> = c.wired().map(|(i, p)| format!("{}:{}", i, p)).collect();
            writeln!(f, "  {} ({} positions): {}", c.designator(), c.len(), wired.join(" "))?;
        }
        Ok(())
    }
}

const fn pin(pin: &'static str, dir: Direction) -> Signals {
    Signals::Pin(Pin { pin, dir })
}

macro_rules! sub {
    ($name:literal, $pin:literal, $dir:expr) => {
        Subsignal { name: $name, pin: $pin, dir: $dir }
    };
}

use Direction::{InOut, Input, Output};

const RESOURCES: &[Resource] = &[
    // Placeholder: the board runs from the SoC's internal clock.
    Resource { name: "sys_clk0", number: 0, signals: pin("63", Input), clock_hz: Some(10_000_000) },
    Resource { name: "button", number: 0, signals: pin("62", Input), clock_hz: None },
    Resource {
        name: "rgb_led",
        number: 0,
        signals: Signals::Subsignals(&[
            sub!("r", "34", Output),
            sub!("g", "39", Output),
            sub!("b", "38", Output),
        ]),
        clock_hz: None,
    },
    Resource {
        name: "uart",
        number: 0,
        signals: Signals::Subsignals(&[sub!("rx", "9", Input), sub!("tx", "8", Output)]),
        clock_hz: None,
    },
    Resource {
        name: "spi_master",
        number: 0,
        signals: Signals::Subsignals(&[
            sub!("clk", "20", Input),
            sub!("miso", "17", Output),
            sub!("mosi", "16", Input),
            sub!("ss", "11", Input),
            sub!("cs2", "28", Input),
            sub!("cs3", "18", Input),
        ]),
        clock_hz: None,
    },
    Resource {
        name: "spi_slave",
        number: 0,
        signals: Signals::Subsignals(&[
            sub!("clk", "40", Input),
            sub!("miso", "42", Output),
            sub!("mosi", "36", Input),
            sub!("cs_n", "37", Input),
        ]),
        clock_hz: None,
    },
    Resource {
        name: "i2c",
        number: 0,
        signals: Signals::Subsignals(&[sub!("scl", "4", InOut), sub!("sda", "5", InOut)]),
        clock_hz: None,
    },
    Resource {
        name: "i2c",
        number: 1,
        signals: Signals::Subsignals(&[sub!("scl", "22", InOut), sub!("sda", "21", InOut)]),
        clock_hz: None,
    },
    Resource {
        name: "usb",
        number: 0,
        signals: Signals::Subsignals(&[sub!("d_p", "10", InOut), sub!("d_n", "14", InOut)]),
        clock_hz: None,
    },
    Resource {
        name: "swd",
        number: 0,
        signals: Signals::Subsignals(&[sub!("clk", "54", InOut), sub!("io", "53", InOut)]),
        clock_hz: None,
    },
];

const CONNECTORS: &[Connector] = &[
    Connector { name: "J", number: 2, pins: "- 28 22 21 37 36 42 40 7 2 4 5" },
    Connector { name: "J", number: 3, pins: "- 8 9 17 16 20 6 55 31 25 47 - - - - 41" },
    Connector { name: "J", number: 8, pins: "27 26 33 32 23 57 56 3 64 62 63 61 59 - - -" },
];

pub static QUICKFEATHER: Board = Board {
    name: "QuickFeather",
    device: "ql-eos-s3_wlcsp",
    package: "PU64",
    default_clock: "sys_clk0",
    resources: RESOURCES,
    connectors: CONNECTORS,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_clock_resource() {
        let clk = QUICKFEATHER.resource(QUICKFEATHER.default_clock, 0).unwrap();
        assert_eq!(clk.clock_hz, Some(10_000_000));
        assert_eq!(clk.signals, Signals::Pin(Pin { pin: "63", dir: Direction::Input }));
    }

    #[test]
    fn test_resource_lookup() {
        let uart = QUICKFEATHER.resource("uart", 0).unwrap();
        assert_eq!(uart.subsignal("tx").unwrap().pin, "8");
        assert_eq!(uart.subsignal("rx").unwrap().dir, Direction::Input);

        let i2c1 = QUICKFEATHER.resource("i2c", 1).unwrap();
        assert_eq!(i2c1.subsignal("scl").unwrap().pin, "22");
        assert_eq!(i2c1.subsignal("sda").unwrap().dir, Direction::InOut);

        assert!(QUICKFEATHER.resource("i2c", 2).is_none());
        assert!(QUICKFEATHER.resource("button", 0).unwrap().subsignal("io").is_none());
    }

    #[test]
    fn test_resource_pins_are_unique() {
        let mut seen = HashSet::new();
        for r in QUICKFEATHER.resources {
            for p in r.device_pins() {
                assert!(seen.insert(p), "pin {} used twice ({}#{})", p, r.name, r.number);
            }
        }
    }

    #[test]
    fn test_connector_positions_start_at_one() {
        let j2 = QUICKFEATHER.connector("J", 2).unwrap();
        assert_eq!(j2.len(), 12);
        assert_eq!(j2.pin(0), None);
        assert_eq!(j2.pin(1), None);
        assert_eq!(j2.pin(2), Some("28"));
        assert_eq!(j2.pin(12), Some("5"));
        assert_eq!(j2.pin(13), None);
    }

    #[test]
    fn test_connector_wired_skips_unconnected() {
        let j3 = QUICKFEATHER.connector("J", 3).unwrap();
        assert_eq!(j3.len(), 16);
        let wired: Vec<_> = j3.wired().collect();
        assert_eq!(wired.first(), Some(&(2, "8")));
        assert_eq!(wired.last(), Some(&(16, "41")));
        assert_eq!(wired.len(), 11);
    }

    #[test]
    fn test_resolve_connector_pin() {
        assert_eq!(QUICKFEATHER.resolve_connector_pin("J8", 1), Some("27"));
        assert_eq!(QUICKFEATHER.resolve_connector_pin("J8", 10), Some("62"));
        assert_eq!(QUICKFEATHER.resolve_connector_pin("J8", 14), None);
        assert_eq!(QUICKFEATHER.resolve_connector_pin("J9", 1), None);
        assert_eq!(QUICKFEATHER.resolve_connector_pin("J", 1), None);
    }

    #[test]
    fn test_board_serializes() {
        let json = serde_json::to_value(&QUICKFEATHER).unwrap();
        assert_eq!(json["device"], "ql-eos-s3_wlcsp");
        assert_eq!(json["resources"][0]["signals"]["pin"], "63");
        assert_eq!(json["resources"][0]["signals"]["dir"], "i");
        assert_eq!(json["resources"][3]["signals"][1]["name"], "tx");
        assert!(json["resources"][1].get("clock_hz").is_none());
    }

    #[test]
    fn test_display_summary() {
        let text = QUICKFEATHER.to_string();
        assert!(text.contains("QuickFeather (ql-eos-s3_wlcsp, package PU64)"));
        assert!(text.contains("sys_clk0#0: pin 63 (Input) @ 10000000 Hz"));
        assert!(text.contains("J2 (12 positions): 2:28"));
    }
}

//! Shared identifiers and classification enums for the parking facility

use serde::{Deserialize, Serialize};

/// Newtype wrapper for location unit (floor) IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct UnitId(pub u32);

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for spot IDs (unique within a unit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SpotId(pub u32);

impl std::fmt::Display for SpotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Facility-wide spot identity: a spot ID is only unique within its unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpotKey {
    pub unit: UnitId,
    pub spot: SpotId,
}

impl SpotKey {
    #[inline]
    pub const fn new(unit: u32, spot: u32) -> Self {
        Self { unit: UnitId(unit), spot: SpotId(spot) }
    }
}

impl std::fmt::Display for SpotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "U{}-S{}", self.unit, self.spot)
    }
}

/// Newtype wrapper for ticket IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TicketId(pub u64);

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for entry/exit panel IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PanelId(pub u32);

impl std::fmt::Display for PanelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque demand identity supplied by the vehicle registry (usually a plate)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DemandId(pub String);

impl DemandId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DemandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Spot size classes, ordered from smallest to largest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Small,
    Medium,
    Large,
    #[serde(alias = "x_large")]
    XLarge,
}

impl SizeClass {
    pub const COUNT: usize = 4;
    pub const ALL: [SizeClass; Self::COUNT] =
        [SizeClass::Small, SizeClass::Medium, SizeClass::Large, SizeClass::XLarge];

    /// Dense index for per-class arrays
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            SizeClass::Small => 0,
            SizeClass::Medium => 1,
            SizeClass::Large => 2,
            SizeClass::XLarge => 3,
        }
    }

    /// Hourly rate in currency units
    #[inline]
    pub const fn hourly_rate(self) -> u64 {
        match self {
            SizeClass::Small => 10,
            SizeClass::Medium => 20,
            SizeClass::Large => 30,
            SizeClass::XLarge => 50,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::Small => "small",
            SizeClass::Medium => "medium",
            SizeClass::Large => "large",
            SizeClass::XLarge => "xlarge",
        }
    }
}

impl std::fmt::Display for SizeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vehicle types admitted by the facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    #[serde(alias = "motor_bike")]
    MotorBike,
    Car,
    Truck,
    Bus,
    Van,
}

impl VehicleType {
    pub const ALL: [VehicleType; 5] = [
        VehicleType::MotorBike,
        VehicleType::Car,
        VehicleType::Truck,
        VehicleType::Bus,
        VehicleType::Van,
    ];

    /// The only size class this vehicle type may occupy
    #[inline]
    pub const fn size_class(self) -> SizeClass {
        match self {
            VehicleType::MotorBike => SizeClass::Small,
            VehicleType::Car => SizeClass::Medium,
            VehicleType::Truck => SizeClass::Large,
            VehicleType::Bus | VehicleType::Van => SizeClass::XLarge,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::MotorBike => "motorbike",
            VehicleType::Car => "car",
            VehicleType::Truck => "truck",
            VehicleType::Bus => "bus",
            VehicleType::Van => "van",
        }
    }
}

impl std::fmt::Display for VehicleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vehicle asking for a spot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demand {
    pub id: DemandId,
    pub vehicle_type: VehicleType,
}

impl Demand {
    pub fn new(id: impl Into<String>, vehicle_type: VehicleType) -> Self {
        Self { id: DemandId::new(id), vehicle_type }
    }

    #[inline]
    pub fn size_class(&self) -> SizeClass {
        self.vehicle_type.size_class()
    }
}

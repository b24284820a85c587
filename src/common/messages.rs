//! # Message Protocol
//!
//! Defines the wire types exchanged between the discovery client and the
//! matching service:
//! - The request payload built from device telemetry ([`DiscoveryRequest`])
//! - The two unary operations, `FindCloudlet` and `VerifyLocation`
//! - Their replies, each carrying an explicit status
//!
//! Messages are serialized to JSON and sent over TCP with a 4-byte length prefix.

use serde::{Deserialize, Serialize};

/// Protocol version stamped on every request.
pub const PROTOCOL_VERSION: u32 = 5;

// ============================================================================
// REQUEST PAYLOAD
// ============================================================================

/// A point-in-time location fix.
///
/// Every field is always present on the wire. When the location provider has
/// no fix, all fields are `0.0` rather than omitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Horizontal accuracy radius in meters
    pub horizontal_accuracy: f64,
    /// Vertical accuracy in meters
    pub vertical_accuracy: f64,
    /// Altitude in meters
    pub altitude: f64,
    /// Bearing in degrees
    pub course: f64,
    /// Ground speed in meters per second
    pub speed: f64,
}

impl LocationSample {
    /// A fix with only a position and horizontal accuracy, remaining fields zero.
    pub fn new(latitude: f64, longitude: f64, horizontal_accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            horizontal_accuracy,
            ..Self::default()
        }
    }
}

/// Kind of subscriber identifier carried in [`CarrierIdentity::id`].
///
/// Only MSISDN-style subscriber numbers are currently supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdType {
    #[default]
    Msisdn,
}

/// Network identity of the device as reported by the telephony provider.
///
/// Any field may be empty when the provider cannot supply it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarrierIdentity {
    pub id_type: IdType,
    /// Subscriber number, empty when unavailable
    pub id: String,
    /// Mobile network code
    pub mnc: String,
    /// Mobile country code
    pub mcc: String,
    /// Human-readable operator name
    pub operator_name: String,
}

/// Serving or neighbouring cell identifiers. Zero when unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellTowerInfo {
    pub cell_id: u32,
    pub location_area_code: u32,
}

/// Identity of the calling application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationContext {
    /// Display label of the application
    pub label: String,
    /// Identifier the service uses to pick the right edge deployment
    pub app_id: String,
}

/// The request sent to both discovery operations.
///
/// Built once per attempt from fresh telemetry and never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    /// Protocol version, never zero
    pub ver: u32,
    pub carrier: CarrierIdentity,
    pub tower: CellTowerInfo,
    /// Application identifier, never empty
    pub app_id: String,
    pub app_label: String,
    /// Protocol the client intends to reach the cloudlet with (e.g. "http")
    pub protocol: String,
    /// Port the client intends to reach the cloudlet on
    pub server_port: u16,
    pub gps_location: LocationSample,
}

// ============================================================================
// REPLY PAYLOAD
// ============================================================================

/// Outcome reported by the service for a `FindCloudlet` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindStatus {
    #[default]
    Unknown,
    Found,
    NotFound,
}

/// Whether the device is attached to the tower named in the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TowerStatus {
    #[default]
    Unknown,
    ConnectedToSpecifiedTower,
    NotConnectedToSpecifiedTower,
}

/// Carrier-side judgement of the reported GPS location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpsLocationStatus {
    #[default]
    Unknown,
    Verified,
    MismatchSameCountry,
    MismatchOtherCountry,
    RoamingCountryMatch,
    RoamingCountryMismatch,
    ErrorUnauthorized,
    ErrorOther,
}

/// The nearest cloudlet able to serve the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudletResponse {
    /// Host name or address of the cloudlet
    pub server: String,
    /// Service path on that host
    pub service: String,
}

// ============================================================================
// MESSAGE TYPES
// ============================================================================

/// Core message enum for all communication with the discovery service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// **Find Cloudlet Request**
    ///
    /// Asks the service for the nearest cloudlet that can serve `request.app_id`.
    FindCloudlet { request: DiscoveryRequest },

    /// **Verify Location Request**
    ///
    /// Asks the service to check `request.gps_location` against the carrier's
    /// own view of the device.
    VerifyLocation { request: DiscoveryRequest },

    /// **Cloudlet Reply**
    ///
    /// # Fields
    /// - `ver`: Protocol version of the reply
    /// - `status`: `Found` only when `server`/`service` are meaningful
    /// - `server`: Host of the selected cloudlet
    /// - `service`: Path of the service on that host
    CloudletReply {
        ver: u32,
        status: FindStatus,
        server: String,
        service: String,
    },

    /// **Verify Reply**
    ///
    /// # Fields
    /// - `ver`: Protocol version of the reply
    /// - `tower_status`: Tower attachment result
    /// - `gps_location_status`: Location judgement, the trust decision
    /// - `gps_location_accuracy_km`: Radius the location was verified within,
    ///   negative when no verification was performed
    VerifyReply {
        ver: u32,
        tower_status: TowerStatus,
        gps_location_status: GpsLocationStatus,
        gps_location_accuracy_km: f64,
    },

    /// **Error Reply**
    ///
    /// Sent by the service when it cannot process a request.
    Error { message: String },
}

impl Message {
    /// Serialize a message to JSON bytes for transmission over the network.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Deserialize a message from JSON bytes received from the network.
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Operation name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Message::FindCloudlet { .. } => "FindCloudlet",
            Message::VerifyLocation { .. } => "VerifyLocation",
            Message::CloudletReply { .. } => "CloudletReply",
            Message::VerifyReply { .. } => "VerifyReply",
            Message::Error { .. } => "Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_location_keeps_every_field_on_the_wire() {
        let value = serde_json::to_value(LocationSample::default()).unwrap();
        let fields = value.as_object().unwrap();

        assert_eq!(fields.len(), 7);
        for (name, field) in fields {
            assert_eq!(field.as_f64(), Some(0.0), "field {} not zero", name);
        }
    }

    #[test]
    fn reply_decodes_from_service_json() {
        let raw = br#"{"CloudletReply":{"ver":5,"status":"Found","server":"edge1.example.com","service":"/api/detect"}}"#;
        let msg = Message::from_bytes(raw).unwrap();

        assert_eq!(
            msg,
            Message::CloudletReply {
                ver: 5,
                status: FindStatus::Found,
                server: "edge1.example.com".to_string(),
                service: "/api/detect".to_string(),
            }
        );
        assert_eq!(msg.name(), "CloudletReply");
    }
}

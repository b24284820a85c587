//! # Telemetry Snapshot
//!
//! Assembles a [`DiscoveryRequest`] from the host's carrier, cell and
//! application telemetry plus an optional location fix.
//!
//! Telemetry reads are best-effort. A missing SIM, an empty neighbour list or a
//! permission the host never obtained degrade the request to default values;
//! only a missing host environment fails the build. This module never asks for
//! permissions itself.

use log::warn;

use crate::common::config::{RequestSettings, TelemetrySettings};
use crate::common::error::{DiscoveryError, Result, TelemetryError};
use crate::common::messages::{
    ApplicationContext, CarrierIdentity, CellTowerInfo, DiscoveryRequest, IdType, LocationSample,
};

/// Source of device and application telemetry supplied by the host.
///
/// The discovery client only ever holds a `Weak` reference to its host
/// environment.
pub trait HostEnvironment: Send + Sync {
    /// Operator name, subscriber number and network codes.
    fn carrier_identity(&self) -> std::result::Result<CarrierIdentity, TelemetryError>;

    /// Neighbouring cells, nearest first. May be empty.
    fn neighboring_cells(&self) -> std::result::Result<Vec<CellTowerInfo>, TelemetryError>;

    /// Label and identifier of the calling application.
    fn application(&self) -> ApplicationContext;
}

/// Build a fresh request from the current telemetry.
///
/// # Errors
/// `InvalidContext` when `environment` is `None`. Telemetry gaps are never errors.
pub fn build_request(
    environment: Option<&dyn HostEnvironment>,
    location: Option<&LocationSample>,
    settings: &RequestSettings,
) -> Result<DiscoveryRequest> {
    let environment = environment.ok_or_else(|| {
        DiscoveryError::InvalidContext(
            "host environment is missing, request cannot read telemetry".to_string(),
        )
    })?;

    let carrier = environment.carrier_identity().unwrap_or_else(|e| {
        warn!("⚠️  Carrier identity unavailable, sending empty identity: {}", e);
        CarrierIdentity::default()
    });

    let tower = match environment.neighboring_cells() {
        Ok(cells) => cells.first().copied().unwrap_or_default(),
        Err(e) => {
            warn!("⚠️  Neighbouring cells unavailable, sending tower 0/0: {}", e);
            CellTowerInfo::default()
        }
    };

    let application = environment.application();
    let app_id = if application.app_id.is_empty() {
        settings.app_id.clone()
    } else {
        application.app_id
    };

    Ok(DiscoveryRequest {
        ver: settings.version,
        carrier,
        tower,
        app_id,
        app_label: application.label,
        protocol: settings.protocol.clone(),
        server_port: settings.server_port,
        gps_location: location.copied().unwrap_or_default(),
    })
}

/// A host environment with fixed telemetry, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    carrier: Option<CarrierIdentity>,
    cells: Vec<CellTowerInfo>,
    application: ApplicationContext,
}

impl StaticEnvironment {
    pub fn new(
        carrier: Option<CarrierIdentity>,
        cells: Vec<CellTowerInfo>,
        application: ApplicationContext,
    ) -> Self {
        Self {
            carrier,
            cells,
            application,
        }
    }

    /// Build from the `[telemetry]` configuration section.
    ///
    /// A zero cell identifier means no neighbour data.
    pub fn from_settings(settings: &TelemetrySettings) -> Self {
        let carrier = CarrierIdentity {
            id_type: IdType::Msisdn,
            id: settings.subscriber_id.clone(),
            mnc: settings.mnc.clone(),
            mcc: settings.mcc.clone(),
            operator_name: settings.operator_name.clone(),
        };
        let cells = if settings.cell_id == 0 {
            Vec::new()
        } else {
            vec![CellTowerInfo {
                cell_id: settings.cell_id,
                location_area_code: settings.location_area_code,
            }]
        };
        let application = ApplicationContext {
            label: settings.app_label.clone(),
            app_id: settings.app_id.clone(),
        };

        Self::new(Some(carrier), cells, application)
    }
}

impl HostEnvironment for StaticEnvironment {
    fn carrier_identity(&self) -> std::result::Result<CarrierIdentity, TelemetryError> {
        self.carrier
            .clone()
            .ok_or_else(|| TelemetryError::Unavailable("no SIM".to_string()))
    }

    fn neighboring_cells(&self) -> std::result::Result<Vec<CellTowerInfo>, TelemetryError> {
        Ok(self.cells.clone())
    }

    fn application(&self) -> ApplicationContext {
        self.application.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DeniedEnvironment;

    impl HostEnvironment for DeniedEnvironment {
        fn carrier_identity(&self) -> std::result::Result<CarrierIdentity, TelemetryError> {
            Err(TelemetryError::PermissionDenied("READ_PHONE_STATE".to_string()))
        }

        fn neighboring_cells(&self) -> std::result::Result<Vec<CellTowerInfo>, TelemetryError> {
            Err(TelemetryError::PermissionDenied("ACCESS_COARSE_LOCATION".to_string()))
        }

        fn application(&self) -> ApplicationContext {
            ApplicationContext::default()
        }
    }

    #[test]
    fn missing_environment_is_invalid_context() {
        let err = build_request(None, None, &RequestSettings::default()).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidContext(_)));
    }

    #[test]
    fn absent_location_is_all_zero() {
        let env = StaticEnvironment::default();
        let request = build_request(Some(&env), None, &RequestSettings::default()).unwrap();

        assert_eq!(request.gps_location, LocationSample::default());
        assert_eq!(request.gps_location.vertical_accuracy, 0.0);
        assert_eq!(request.gps_location.speed, 0.0);
    }

    #[test]
    fn denied_telemetry_degrades_to_defaults() {
        let settings = RequestSettings::default();
        let location = LocationSample::new(37.7749, -122.4194, 5.0);

        let request = build_request(Some(&DeniedEnvironment), Some(&location), &settings).unwrap();

        assert_eq!(request.carrier, CarrierIdentity::default());
        assert_eq!(request.tower, CellTowerInfo::default());
        assert_eq!(request.app_id, settings.app_id);
        assert_eq!(request.gps_location.latitude, 37.7749);
        assert_eq!(request.ver, settings.version);
    }

    #[test]
    fn first_neighbour_becomes_the_tower() {
        let env = StaticEnvironment::new(
            None,
            vec![
                CellTowerInfo { cell_id: 11, location_area_code: 3 },
                CellTowerInfo { cell_id: 12, location_area_code: 4 },
            ],
            ApplicationContext {
                label: "Face Detection".to_string(),
                app_id: "face-detect".to_string(),
            },
        );

        let request = build_request(Some(&env), None, &RequestSettings::default()).unwrap();

        assert_eq!(request.tower, CellTowerInfo { cell_id: 11, location_area_code: 3 });
        assert_eq!(request.app_id, "face-detect");
        assert_eq!(request.app_label, "Face Detection");
    }

    #[test]
    fn settings_without_cell_id_have_no_neighbours() {
        let settings = TelemetrySettings {
            operator_name: "TDG".to_string(),
            mcc: "262".to_string(),
            mnc: "01".to_string(),
            ..TelemetrySettings::default()
        };
        let env = StaticEnvironment::from_settings(&settings);

        assert!(env.neighboring_cells().unwrap().is_empty());
        let carrier = env.carrier_identity().unwrap();
        assert_eq!(carrier.operator_name, "TDG");
        assert_eq!(carrier.id, "");
    }
}

//! Canonical catalog of routable OCPP action names.
//!
//! OCPP 1.6 and 2.x are merged into one table: action names rarely collide
//! between generations, and payload-shape differences are resolved inside the
//! handlers rather than at the routing layer. Anything not in this catalog is
//! answered with a `NotImplemented` CallError.

pub const AUTHORIZE: &str = "Authorize";
pub const BOOT_NOTIFICATION: &str = "BootNotification";
pub const CLEARED_CHARGING_LIMIT: &str = "ClearedChargingLimit";
pub const COST_UPDATED: &str = "CostUpdated";
pub const DATA_TRANSFER: &str = "DataTransfer";
pub const DIAGNOSTICS_STATUS_NOTIFICATION: &str = "DiagnosticsStatusNotification";
pub const FIRMWARE_STATUS_NOTIFICATION: &str = "FirmwareStatusNotification";
pub const GET_15118_EV_CERTIFICATE: &str = "Get15118EVCertificate";
pub const GET_CERTIFICATE_STATUS: &str = "GetCertificateStatus";
pub const HEARTBEAT: &str = "Heartbeat";
pub const LOG_STATUS_NOTIFICATION: &str = "LogStatusNotification";
pub const METER_VALUES: &str = "MeterValues";
pub const NOTIFY_CHARGING_LIMIT: &str = "NotifyChargingLimit";
pub const NOTIFY_CUSTOMER_INFORMATION: &str = "NotifyCustomerInformation";
pub const NOTIFY_DISPLAY_MESSAGES: &str = "NotifyDisplayMessages";
pub const NOTIFY_EV_CHARGING_NEEDS: &str = "NotifyEVChargingNeeds";
pub const NOTIFY_EV_CHARGING_SCHEDULE: &str = "NotifyEVChargingSchedule";
pub const NOTIFY_EVENT: &str = "NotifyEvent";
pub const NOTIFY_MONITORING_REPORT: &str = "NotifyMonitoringReport";
pub const NOTIFY_REPORT: &str = "NotifyReport";
pub const PUBLISH_FIRMWARE_STATUS_NOTIFICATION: &str = "PublishFirmwareStatusNotification";
pub const REPORT_CHARGING_PROFILES: &str = "ReportChargingProfiles";
pub const RESERVATION_STATUS_UPDATE: &str = "ReservationStatusUpdate";
pub const SECURITY_EVENT_NOTIFICATION: &str = "SecurityEventNotification";
pub const SIGN_CERTIFICATE: &str = "SignCertificate";
pub const START_TRANSACTION: &str = "StartTransaction";
pub const STATUS_NOTIFICATION: &str = "StatusNotification";
pub const STOP_TRANSACTION: &str = "StopTransaction";
pub const TRANSACTION_EVENT: &str = "TransactionEvent";

/// Every action the dispatch registry routes.
pub const ALL: &[&str] = &[
    AUTHORIZE,
    BOOT_NOTIFICATION,
    CLEARED_CHARGING_LIMIT,
    COST_UPDATED,
    DATA_TRANSFER,
    DIAGNOSTICS_STATUS_NOTIFICATION,
    FIRMWARE_STATUS_NOTIFICATION,
    GET_15118_EV_CERTIFICATE,
    GET_CERTIFICATE_STATUS,
    HEARTBEAT,
    LOG_STATUS_NOTIFICATION,
    METER_VALUES,
    NOTIFY_CHARGING_LIMIT,
    NOTIFY_CUSTOMER_INFORMATION,
    NOTIFY_DISPLAY_MESSAGES,
    NOTIFY_EV_CHARGING_NEEDS,
    NOTIFY_EV_CHARGING_SCHEDULE,
    NOTIFY_EVENT,
    NOTIFY_MONITORING_REPORT,
    NOTIFY_REPORT,
    PUBLISH_FIRMWARE_STATUS_NOTIFICATION,
    REPORT_CHARGING_PROFILES,
    RESERVATION_STATUS_UPDATE,
    SECURITY_EVENT_NOTIFICATION,
    SIGN_CERTIFICATE,
    START_TRANSACTION,
    STATUS_NOTIFICATION,
    STOP_TRANSACTION,
    TRANSACTION_EVENT,
];

/// Exact, case-sensitive catalog membership check.
pub fn is_known(action: &str) -> bool {
    ALL.contains(&action)
}

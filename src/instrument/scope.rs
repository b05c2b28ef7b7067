//! SCPI command set of the Rigol DS2000/MSO2000 family.

use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use super::session::{Session, SessionGuard, TransportError, TransportSettings};
use super::tcp::TcpSession;
use crate::metadata::CalibrationRecord;

pub const DISPLAY_DUMP: &str = ":DISPlay:DATA?";
pub const IDENTITY: &str = "*IDN?";
pub const CALIBRATION_DATE: &str = ":CALibrate:DATE?";
pub const CALIBRATION_TIME: &str = ":CALibrate:TIME?";
pub const SET_DATE: &str = ":SYSTem:DATE";
pub const SET_TIME: &str = ":SYSTem:TIME";
pub const MEASURE_CLEAR: &str = ":MEASure:CLEar ALL";
/// Appended to a command so the reply doubles as the completion acknowledgement.
pub const OPERATION_COMPLETE: &str = "*OPC?";

/// Requests the screen bitmap. The reply still carries its block header.
pub fn display_dump<S: Session + ?Sized>(session: &mut S) -> Result<Vec<u8>, TransportError> {
    session.write(DISPLAY_DUMP)?;
    let raw = session.read_raw()?;
    info!(resource = %session.resource(), bytes = raw.len(), "Display dump received");
    Ok(raw)
}

pub fn identity<S: Session + ?Sized>(session: &mut S) -> Result<String, TransportError> {
    session.query(IDENTITY)
}

pub fn calibration<S: Session + ?Sized>(
    session: &mut S,
) -> Result<CalibrationRecord, TransportError> {
    let date = session.query(CALIBRATION_DATE)?;
    let time = session.query(CALIBRATION_TIME)?;
    debug!(date = %date, time = %time, "Calibration record");
    Ok(CalibrationRecord { date, time })
}

/// Sets the instrument clock to `now`, waiting for completion after each command.
pub fn sync_clock<S: Session + ?Sized>(
    session: &mut S,
    now: NaiveDateTime,
) -> Result<(), TransportError> {
    let date = now.format("%Y,%m,%d").to_string();
    let time = now.format("%H,%M,%S").to_string();
    query_until_complete(session, &format!("{SET_DATE} {date}"))?;
    query_until_complete(session, &format!("{SET_TIME} {time}"))?;
    info!(resource = %session.resource(), date = %date, time = %time, "Instrument clock synchronized");
    Ok(())
}

/// Removes measurement readouts from the screen, then lets the display settle.
pub fn clear_measurements<S: Session + ?Sized>(
    session: &mut S,
    settle: Duration,
) -> Result<(), TransportError> {
    query_until_complete(session, MEASURE_CLEAR)?;
    std::thread::sleep(settle);
    info!(resource = %session.resource(), settle_ms = settle.as_millis() as u64, "Measurements cleared");
    Ok(())
}

fn query_until_complete<S: Session + ?Sized>(
    session: &mut S,
    command: &str,
) -> Result<(), TransportError> {
    let reply = session.query(&format!("{command};{OPERATION_COMPLETE}"))?;
    if reply.trim() == "1" {
        Ok(())
    } else {
        Err(TransportError::Protocol {
            resource: session.resource().to_string(),
            detail: format!("expected operation-complete '1' after '{command}', got '{reply}'"),
        })
    }
}

/// Opens `resource` just long enough to ask for its identity.
pub fn probe(resource: &str, settings: TransportSettings) -> Result<String, TransportError> {
    let mut session = SessionGuard::new(TcpSession::open(resource, settings)?);
    identity(&mut *session)
}

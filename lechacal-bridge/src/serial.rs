//! Serial line source.

use thiserror::Error;
use tokio::io::BufReader;
use tokio_serial::SerialStream;

/// Failure to open the serial device.
#[derive(Debug, Error)]
#[error("Failed to open serial port {port} at {baud_rate} baud: {source}")]
pub struct SerialError {
    pub port: String,
    pub baud_rate: u32,
    #[source]
    pub source: tokio_serial::Error,
}

/// Open the device's serial port as a buffered line source (8N1).
pub fn open_line_source(port: &str, baud_rate: u32) -> Result<BufReader<SerialStream>, SerialError> {
    let builder = tokio_serial::new(port, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One);

    let stream = SerialStream::open(&builder).map_err(|source| SerialError {
        port: port.to_string(),
        baud_rate,
        source,
    })?;

    tracing::info!(port = %port, baud_rate, "Opened serial port");
    Ok(BufReader::new(stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device_fails() {
        let err = open_line_source("/dev/lechacal-does-not-exist", 38400).unwrap_err();
        assert_eq!(err.port, "/dev/lechacal-does-not-exist");
        assert!(err.to_string().contains("38400 baud"));
    }
}

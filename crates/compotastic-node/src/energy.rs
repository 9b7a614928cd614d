//! Airtime energy estimate for frames sent over the mesh.

use serde::Serialize;

use crate::error::{Error, Result};

/// Radio characteristics used for the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyModel {
    pub data_rate_bps: f64,
    pub tx_current_ma: f64,
    pub rx_current_ma: f64,
}

impl Default for EnergyModel {
    fn default() -> Self {
        Self {
            data_rate_bps: 9600.0,
            tx_current_ma: 120.0,
            rx_current_ma: 45.0,
        }
    }
}

/// Estimated charge spent moving some bytes across the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyEstimate {
    pub bits_sent: u64,
    pub tx_time_seconds: f64,
    pub rx_time_seconds: f64,
    pub tx_amp_hours: f64,
    pub rx_amp_hours: f64,
    pub total_amp_hours: f64,
}

impl std::fmt::Display for EnergyEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "tx={:.6}Ah rx={:.6}Ah total={:.6}Ah",
            self.tx_amp_hours, self.rx_amp_hours, self.total_amp_hours
        )
    }
}

impl EnergyModel {
    /// One sender transmits, every other device in range listens.
    pub fn estimate(&self, bytes_sent: u64, device_count: usize) -> Result<EnergyEstimate> {
        if device_count == 0 {
            return Err(Error::Config("device count must be at least 1".into()));
        }
        if self.data_rate_bps <= 0.0 {
            return Err(Error::Config("data rate must be positive".into()));
        }

        let bits_sent = bytes_sent * 8;
        let tx_time_seconds = bits_sent as f64 / self.data_rate_bps;
        let rx_time_seconds = tx_time_seconds * (device_count - 1) as f64;
        let tx_amp_hours = (self.tx_current_ma / 1000.0) * (tx_time_seconds / 3600.0);
        let rx_amp_hours = (self.rx_current_ma / 1000.0) * (rx_time_seconds / 3600.0);

        Ok(EnergyEstimate {
            bits_sent,
            tx_time_seconds,
            rx_time_seconds,
            tx_amp_hours,
            rx_amp_hours,
            total_amp_hours: tx_amp_hours + rx_amp_hours,
        })
    }
}

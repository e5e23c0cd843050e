//! Telemetry sampling.

/// Source of the plaintext readings the pipeline protects.
pub trait TelemetrySource: Send {
    fn sample(&mut self) -> String;
}

/// Stand-in for the battery-management hardware: reports the full-cycle
/// counter in the battery-passport attribute path format.
pub struct SimulatedBattery {
    full_cycles: u32,
}

impl SimulatedBattery {
    pub fn new(full_cycles: u32) -> Self {
        Self { full_cycles }
    }
}

impl Default for SimulatedBattery {
    fn default() -> Self {
        Self::new(200)
    }
}

impl TelemetrySource for SimulatedBattery {
    fn sample(&mut self) -> String {
        format!(
            "performance.batteryCondition.numberOfFullCycles.numberOfFullCyclesValue: {}",
            self.full_cycles
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_uses_the_passport_attribute_path() {
        let mut battery = SimulatedBattery::new(42);
        assert_eq!(
            battery.sample(),
            "performance.batteryCondition.numberOfFullCycles.numberOfFullCyclesValue: 42"
        );
    }
}

//! TCP-connect latency probing and the network-quality classification
//! derived from it.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use jumplink_progress::{Event, ProgressBus};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_LATENCY_S: f64 = 0.1;
const QUALITY_CHANGE_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl NetworkQuality {
    /// Recommended initial chunk size for this quality band.
    pub fn initial_chunk_size(self) -> usize {
        match self {
            NetworkQuality::Excellent => 128 * 1024,
            NetworkQuality::Good => 96 * 1024,
            NetworkQuality::Fair => 64 * 1024,
            NetworkQuality::Poor => 32 * 1024,
        }
    }
}

/// Classify a round-trip latency into a quality band.
pub fn classify(latency_s: f64) -> NetworkQuality {
    if latency_s < 0.020 {
        NetworkQuality::Excellent
    } else if latency_s < 0.050 {
        NetworkQuality::Good
    } else if latency_s < 0.150 {
        NetworkQuality::Fair
    } else {
        NetworkQuality::Poor
    }
}

/// Measures round-trip connect latency to a host, retaining the last
/// known-good value as a fallback and optionally reporting significant
/// swings through a [`ProgressBus`].
pub struct LatencyProbe {
    last_latency_s: f64,
}

impl Default for LatencyProbe {
    fn default() -> Self {
        Self {
            last_latency_s: DEFAULT_LATENCY_S,
        }
    }
}

impl LatencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_latency_s(&self) -> f64 {
        self.last_latency_s
    }

    /// Take `attempts` TCP-connect samples against `host:port`, trim the
    /// extremes when there are at least 3, and fold the result into
    /// `last_latency_s`.
    pub fn measure_tcp(&mut self, host: &str, port: u16, attempts: u32) -> f64 {
        let mut samples = Vec::with_capacity(attempts as usize);
        for _ in 0..attempts {
            if let Some(sample) = Self::single_attempt(host, port) {
                samples.push(sample);
            }
        }

        let measured = if samples.len() >= 3 {
            samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let trimmed = &samples[1..samples.len() - 1];
            trimmed.iter().sum::<f64>() / trimmed.len() as f64
        } else if !samples.is_empty() {
            samples.iter().sum::<f64>() / samples.len() as f64
        } else {
            self.last_latency_s
        };

        self.last_latency_s = measured;
        measured
    }

    fn single_attempt(host: &str, port: u16) -> Option<f64> {
        let addr = (host, port).to_socket_addrs().ok()?.next()?;
        let start = Instant::now();
        TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).ok()?;
        Some(start.elapsed().as_secs_f64())
    }

    /// Remeasure and, if the relative change exceeds 30%, publish a
    /// `NetworkQualityChanged` event. Returns the freshly measured value.
    pub fn remeasure_and_report(
        &mut self,
        host: &str,
        port: u16,
        attempts: u32,
        bus: &ProgressBus,
    ) -> f64 {
        let old = self.last_latency_s;
        let new = self.measure_tcp(host, port, attempts);
        if old > 0.0 && ((new - old).abs() / old) > QUALITY_CHANGE_THRESHOLD {
            bus.publish(Event::NetworkQualityChanged {
                old_latency_s: old,
                new_latency_s: new,
            });
        }
        new
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_boundaries_match_the_quality_bands() {
        assert_eq!(classify(0.010), NetworkQuality::Excellent);
        assert_eq!(classify(0.030), NetworkQuality::Good);
        assert_eq!(classify(0.100), NetworkQuality::Fair);
        assert_eq!(classify(0.200), NetworkQuality::Poor);
    }

    #[test]
    fn initial_chunk_sizes_decrease_as_quality_worsens() {
        assert_eq!(NetworkQuality::Excellent.initial_chunk_size(), 128 * 1024);
        assert_eq!(NetworkQuality::Good.initial_chunk_size(), 96 * 1024);
        assert_eq!(NetworkQuality::Fair.initial_chunk_size(), 64 * 1024);
        assert_eq!(NetworkQuality::Poor.initial_chunk_size(), 32 * 1024);
    }

    #[test]
    fn measuring_against_an_unreachable_host_falls_back_to_last_known_value() {
        let mut probe = LatencyProbe::new();
        let baseline = probe.last_latency_s();
        // Port 1 on loopback is reliably refused/unreachable in test sandboxes.
        let measured = probe.measure_tcp("127.0.0.1", 1, 1);
        assert_eq!(measured, baseline);
    }

    #[test]
    fn measure_tcp_against_a_live_listener_returns_a_nonnegative_latency() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            for stream in listener.incoming().take(5) {
                drop(stream);
            }
        });

        let mut probe = LatencyProbe::new();
        let latency = probe.measure_tcp("127.0.0.1", port, 5);
        assert!(latency >= 0.0);
    }
}

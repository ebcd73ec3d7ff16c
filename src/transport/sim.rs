//! Simulated channel: returns MA5800-shaped canned output keyed off the
//! command text, so everything above the transport runs unmodified and the
//! parsers see the same shapes a real device produces. Always reports
//! connected. Signal and temperature values carry seeded pseudo-random
//! jitter; tests construct a fixed-seed channel for reproducible output.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Channel;
use crate::error::{OltError, Result};

pub struct SimChannel {
    rng: StdRng,
}

impl SimChannel {
    pub fn new() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    fn signal(&mut self) -> f64 {
        -20.0 - self.rng.gen_range(0.0..10.0)
    }

    fn temperature(&mut self) -> f64 {
        (35.0 + self.rng.gen_range(0.0_f64..10.0)).round()
    }
}

impl Default for SimChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for SimChannel {
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn send(&mut self, command: &str) -> Result<String> {
        // Unknown serials exercise the device-error path in simulation too
        if command.contains("UNKNOWN") {
            return Err(OltError::Command(format!("Failure: ONT does not exist\n{command}")));
        }

        if command.starts_with("display version") {
            return Ok("\
  Huawei Integrated Access Software
  PRODUCT : MA5800-X7
  VERSION : MA5800V100R019C10
  PATCH   : SPC100
  UPTIME  : 126 days, 12 hours
  MA5800-X7#"
                .to_string());
        }

        if command.starts_with("display temperature") {
            return Ok(format!(
                "  Current temperature : {} C\n  MA5800-X7#",
                self.temperature()
            ));
        }

        if command.starts_with("display ont info") {
            let s1 = self.signal();
            let s2 = self.signal();
            let s3 = self.signal();
            return Ok(format!(
                "\
  Frame 0
  Slot 1
  -----------------------------------------------------------------------------
  P  ONT-ID  Type      SN            Status   Signal  Description
  -----------------------------------------------------------------------------
  0  1       HG8245H   HWTC11112222  online   {s1:.2}  joao silva
  0  2       HG8310M   HWTC33334444  offline  {s2:.2}  maria souza
  Slot 2
  3  1       HG8245Q2  HWTC55556666  online   {s3:.2}  predio b
  MA5800-X7#"
            ));
        }

        if command.starts_with("display ont autofind") {
            return Ok("\
  -----------------------------------------------------------------------------
  SN            Port  FirstSeen            Status
  -----------------------------------------------------------------------------
  HWTC77778888  0     2024-03-01_10:22:31  waiting
  HWTC99990000  2     2024-03-01_11:05:02  waiting
  MA5800-X7#"
                .to_string());
        }

        if command.starts_with("show onu status") {
            return Ok(format!(
                "\
  Run state   : Online
  Uptime      : 10 days, 2 hours
  Temperature : {} C
  MA5800-X7#",
                self.temperature()
            ));
        }

        if command.starts_with("show onu optical-info") {
            return Ok(format!("  Rx power    : {:.2} dBm\n  MA5800-X7#", self.signal()));
        }

        if command.starts_with("show onu port-config") {
            return Ok("\
  Port     Admin    Mode  DHCP        VLAN
  -----------------------------------------------------------------------------
  eth_0/1  Enabled  LAN   No-control  100
  eth_0/2  Enabled  LAN   No-control  100
  eth_0/3  Enabled  LAN   Snooping    200
  eth_0/4  Disabled LAN   No-control  100
  MA5800-X7#"
                .to_string());
        }

        // Configuration and mode commands echo a success marker
        Ok(format!("{command}\n  success!\n  MA5800-X7(config)#"))
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

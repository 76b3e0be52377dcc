//! Adversary Configuration
//!
//! Operator-facing configuration for the misbehaving node: which attacks the
//! node is equipped with, which of them are switched on, the fake identity
//! used by the sybil attack, and the transmission cadence.

use core::fmt;
use core::str::FromStr;
use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::{AdversaryError, Result};
use crate::types::{LinkAddr, LINK_ADDR_LEN};

// ----------------------------------------------------------------------------
// Attack Kinds
// ----------------------------------------------------------------------------

/// Attack modes, declared in the order the controller applies them
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    /// Sybil: operate under a link identity derived from the fake ID
    IdentitySpoof,
    /// DIS flooding on its own sub-cadence
    ControlFlood,
    /// Bump the DODAG version every cycle
    VersionTamper,
    /// Advertise the minimum rank every cycle
    Sinkhole,
    /// Count but do not transmit the periodic payload
    SelectiveForwarding,
}

impl AttackKind {
    /// Every attack in application order
    pub const ALL: [AttackKind; 5] = [
        AttackKind::IdentitySpoof,
        AttackKind::ControlFlood,
        AttackKind::VersionTamper,
        AttackKind::Sinkhole,
        AttackKind::SelectiveForwarding,
    ];

    /// Short tag used in log lines
    pub fn tag(self) -> &'static str {
        match self {
            AttackKind::IdentitySpoof => "SYA",
            AttackKind::ControlFlood => "DFA",
            AttackKind::VersionTamper => "VNA",
            AttackKind::Sinkhole => "SHA",
            AttackKind::SelectiveForwarding => "SFA",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for AttackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttackKind::IdentitySpoof => "identity_spoof",
            AttackKind::ControlFlood => "control_flood",
            AttackKind::VersionTamper => "version_tamper",
            AttackKind::Sinkhole => "sinkhole",
            AttackKind::SelectiveForwarding => "selective_forwarding",
        };
        f.write_str(name)
    }
}

impl FromStr for AttackKind {
    type Err = AdversaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "identity_spoof" | "sybil" | "sya" => Ok(AttackKind::IdentitySpoof),
            "control_flood" | "dis_flood" | "dfa" => Ok(AttackKind::ControlFlood),
            "version_tamper" | "version" | "vna" => Ok(AttackKind::VersionTamper),
            "sinkhole" | "sha" => Ok(AttackKind::Sinkhole),
            "selective_forwarding" | "sfa" => Ok(AttackKind::SelectiveForwarding),
            _ => Err(AdversaryError::config_error(format!("unknown attack '{}'", s))),
        }
    }
}

// ----------------------------------------------------------------------------
// Attack Flags
// ----------------------------------------------------------------------------

/// One enable bit per attack mode, all disabled by default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackFlags {
    pub identity_spoof: bool,
    pub control_flood: bool,
    pub version_tamper: bool,
    pub sinkhole: bool,
    pub selective_forwarding: bool,
}

impl AttackFlags {
    /// Every attack switched on
    pub fn all() -> Self {
        Self {
            identity_spoof: true,
            control_flood: true,
            version_tamper: true,
            sinkhole: true,
            selective_forwarding: true,
        }
    }

    pub fn is_enabled(&self, kind: AttackKind) -> bool {
        match kind {
            AttackKind::IdentitySpoof => self.identity_spoof,
            AttackKind::ControlFlood => self.control_flood,
            AttackKind::VersionTamper => self.version_tamper,
            AttackKind::Sinkhole => self.sinkhole,
            AttackKind::SelectiveForwarding => self.selective_forwarding,
        }
    }

    pub fn set(&mut self, kind: AttackKind, enabled: bool) {
        let slot = match kind {
            AttackKind::IdentitySpoof => &mut self.identity_spoof,
            AttackKind::ControlFlood => &mut self.control_flood,
            AttackKind::VersionTamper => &mut self.version_tamper,
            AttackKind::Sinkhole => &mut self.sinkhole,
            AttackKind::SelectiveForwarding => &mut self.selective_forwarding,
        };
        *slot = enabled;
    }

    /// Builder-style toggle
    pub fn with(mut self, kind: AttackKind, enabled: bool) -> Self {
        self.set(kind, enabled);
        self
    }

    /// Enabled attacks in application order
    pub fn enabled(&self) -> impl Iterator<Item = AttackKind> + '_ {
        AttackKind::ALL.into_iter().filter(|kind| self.is_enabled(*kind))
    }
}

// ----------------------------------------------------------------------------
// Capability Set
// ----------------------------------------------------------------------------

/// Set of attacks a node is equipped with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<AttackKind>", into = "Vec<AttackKind>")]
pub struct AttackSet(u8);

impl AttackSet {
    pub const EMPTY: Self = Self(0);

    pub fn all() -> Self {
        AttackKind::ALL.into_iter().collect()
    }

    pub fn contains(&self, kind: AttackKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn insert(&mut self, kind: AttackKind) {
        self.0 |= kind.bit();
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Members in application order
    pub fn iter(&self) -> impl Iterator<Item = AttackKind> + '_ {
        AttackKind::ALL.into_iter().filter(|kind| self.contains(*kind))
    }
}

impl Default for AttackSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<AttackKind> for AttackSet {
    fn from_iter<I: IntoIterator<Item = AttackKind>>(iter: I) -> Self {
        let mut set = AttackSet::EMPTY;
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl From<Vec<AttackKind>> for AttackSet {
    fn from(kinds: Vec<AttackKind>) -> Self {
        kinds.into_iter().collect()
    }
}

impl From<AttackSet> for Vec<AttackKind> {
    fn from(set: AttackSet) -> Self {
        set.iter().collect()
    }
}

/// Named capability presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackProfile {
    /// Benign client, no attacks available
    None,
    /// Selective forwarding and sinkhole only
    SelectiveForwarding,
    /// All five attacks
    Full,
}

impl AttackProfile {
    pub fn capabilities(self) -> AttackSet {
        match self {
            AttackProfile::None => AttackSet::EMPTY,
            AttackProfile::SelectiveForwarding => {
                [AttackKind::SelectiveForwarding, AttackKind::Sinkhole]
                    .into_iter()
                    .collect()
            }
            AttackProfile::Full => AttackSet::all(),
        }
    }
}

impl FromStr for AttackProfile {
    type Err = AdversaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "benign" => Ok(AttackProfile::None),
            "sfa" | "selective_forwarding" | "selective-forwarding" => {
                Ok(AttackProfile::SelectiveForwarding)
            }
            "sya" | "full" | "all" => Ok(AttackProfile::Full),
            _ => Err(AdversaryError::config_error(format!("unknown profile '{}'", s))),
        }
    }
}

// ----------------------------------------------------------------------------
// Fake Identity
// ----------------------------------------------------------------------------

/// 8-bit fake node ID used by the identity spoof
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FakeIdentity(u8);

impl FakeIdentity {
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// Link address derived from the fake ID
    ///
    /// The ID is read as a 16-bit value whose high and low bytes are written
    /// to every even and odd byte position respectively. For an 8-bit ID the
    /// high byte is always zero, so `0x2a` yields `00 2a 00 2a 00 2a 00 2a`.
    pub fn link_addr(self) -> LinkAddr {
        let id = u16::from(self.0);
        let [high, low] = id.to_be_bytes();
        let mut bytes = [0u8; LINK_ADDR_LEN];
        for pair in bytes.chunks_exact_mut(2) {
            pair[0] = high;
            pair[1] = low;
        }
        LinkAddr::new(bytes)
    }
}

impl fmt::Display for FakeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Schedule Configuration
// ----------------------------------------------------------------------------

/// How the next cycle is armed after a selectively dropped packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DropRearm {
    /// Fixed short retry interval measured from now
    Short { interval_ms: u64 },
    /// Previous interval measured from the previous deadline (timer reset)
    RepeatPrevious,
    /// Ordinary jittered interval, same as a successful send
    Jittered,
}

impl Default for DropRearm {
    fn default() -> Self {
        DropRearm::Short { interval_ms: 1_000 }
    }
}

/// Cadence of the main cycle and of the DIS flood
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Nominal send interval
    pub base_interval_ms: u64,
    /// Jitter unit; actual interval is `base - unit + U[0, 2*unit)`
    pub jitter_unit_ms: u64,
    /// Minimum spacing between two DIS solicitations
    pub flood_interval_ms: u64,
    /// Re-arm policy after a dropped packet
    pub drop_rearm: DropRearm,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 10_000, // SEND_INTERVAL
            jitter_unit_ms: 1_000,    // CLOCK_SECOND
            flood_interval_ms: 5_000, // 5 * CLOCK_SECOND
            drop_rearm: DropRearm::default(),
        }
    }
}

impl ScheduleConfig {
    /// Ten times faster cadence, handy for tests and demos
    pub fn testing() -> Self {
        Self {
            base_interval_ms: 1_000,
            jitter_unit_ms: 100,
            flood_interval_ms: 500,
            drop_rearm: DropRearm::Short { interval_ms: 100 },
        }
    }

    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    pub fn jitter_unit(&self) -> Duration {
        Duration::from_millis(self.jitter_unit_ms)
    }

    pub fn flood_interval(&self) -> Duration {
        Duration::from_millis(self.flood_interval_ms)
    }
}

// ----------------------------------------------------------------------------
// Transmission Configuration
// ----------------------------------------------------------------------------

/// Settings of the periodic UDP client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmissionConfig {
    /// Emit a Tx/Rx/Missed summary every this many sends
    pub summary_every: u32,
    /// Local UDP port
    pub client_port: u16,
    /// Root-side UDP port
    pub server_port: u16,
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            summary_every: 10,
            client_port: 8765,
            server_port: 5678,
        }
    }
}

// ----------------------------------------------------------------------------
// Complete Configuration
// ----------------------------------------------------------------------------

/// Complete configuration of one adversary node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdversaryConfig {
    /// Attacks the node is equipped with
    #[serde(default)]
    pub capabilities: AttackSet,
    /// Attacks currently switched on
    #[serde(default)]
    pub attacks: AttackFlags,
    /// Fake ID for the identity spoof
    #[serde(default)]
    pub fake_identity: FakeIdentity,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub transmission: TransmissionConfig,
}

impl AdversaryConfig {
    /// Configuration for a named profile, every attack initially off
    pub fn for_profile(profile: AttackProfile) -> Self {
        Self {
            capabilities: profile.capabilities(),
            ..Self::default()
        }
    }

    pub fn with_attack(mut self, kind: AttackKind, enabled: bool) -> Self {
        self.attacks.set(kind, enabled);
        self
    }

    pub fn with_fake_identity(mut self, id: u8) -> Self {
        self.fake_identity = FakeIdentity::new(id);
        self
    }

    pub fn with_schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = schedule;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let schedule = &self.schedule;
        if schedule.jitter_unit_ms == 0 {
            return Err(AdversaryError::config_error("jitter_unit_ms must be positive"));
        }
        if schedule.base_interval_ms <= schedule.jitter_unit_ms {
            return Err(AdversaryError::config_error(format!(
                "base_interval_ms ({}) must exceed jitter_unit_ms ({})",
                schedule.base_interval_ms, schedule.jitter_unit_ms
            )));
        }
        if schedule.flood_interval_ms == 0 {
            return Err(AdversaryError::config_error("flood_interval_ms must be positive"));
        }
        if let DropRearm::Short { interval_ms: 0 } = schedule.drop_rearm {
            return Err(AdversaryError::config_error(
                "drop_rearm interval_ms must be positive",
            ));
        }
        if self.transmission.summary_every == 0 {
            return Err(AdversaryError::config_error("summary_every must be positive"));
        }
        validate_flags(&self.capabilities, &self.attacks)
    }
}

/// Reject flags raised for attacks outside the capability set
pub fn validate_flags(capabilities: &AttackSet, flags: &AttackFlags) -> Result<()> {
    match flags.enabled().find(|kind| !capabilities.contains(*kind)) {
        Some(attack) => Err(AdversaryError::AttackUnavailable { attack }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_default_disabled() {
        let flags = AttackFlags::default();
        assert!(AttackKind::ALL.iter().all(|kind| !flags.is_enabled(*kind)));
        assert_eq!(flags.enabled().count(), 0);
    }

    #[test]
    fn test_flags_set_and_order() {
        let flags = AttackFlags::default()
            .with(AttackKind::SelectiveForwarding, true)
            .with(AttackKind::IdentitySpoof, true)
            .with(AttackKind::Sinkhole, true);
        let order: Vec<_> = flags.enabled().collect();
        assert_eq!(
            order,
            vec![
                AttackKind::IdentitySpoof,
                AttackKind::Sinkhole,
                AttackKind::SelectiveForwarding
            ]
        );
    }

    #[test]
    fn test_fake_identity_derivation() {
        let addr = FakeIdentity::new(0x2a).link_addr();
        assert_eq!(
            addr.as_bytes(),
            &[0x00, 0x2a, 0x00, 0x2a, 0x00, 0x2a, 0x00, 0x2a]
        );
        assert_eq!(FakeIdentity::new(0).link_addr(), LinkAddr::NULL);
    }

    #[test]
    fn test_profiles() {
        let sfa = AttackProfile::SelectiveForwarding.capabilities();
        assert!(sfa.contains(AttackKind::SelectiveForwarding));
        assert!(sfa.contains(AttackKind::Sinkhole));
        assert!(!sfa.contains(AttackKind::ControlFlood));
        assert_eq!(AttackProfile::Full.capabilities(), AttackSet::all());
        assert!(AttackProfile::None.capabilities().is_empty());
        assert_eq!("sya".parse::<AttackProfile>().unwrap(), AttackProfile::Full);
    }

    #[test]
    fn test_attack_kind_parse() {
        assert_eq!("sinkhole".parse::<AttackKind>().unwrap(), AttackKind::Sinkhole);
        assert_eq!("DFA".parse::<AttackKind>().unwrap(), AttackKind::ControlFlood);
        assert_eq!(
            "version-tamper".parse::<AttackKind>().unwrap(),
            AttackKind::VersionTamper
        );
        assert!("wormhole".parse::<AttackKind>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_schedule() {
        let mut config = AdversaryConfig::default();
        assert!(config.validate().is_ok());

        config.schedule.base_interval_ms = config.schedule.jitter_unit_ms;
        assert!(matches!(
            config.validate(),
            Err(AdversaryError::Configuration { .. })
        ));

        let mut config = AdversaryConfig::default();
        config.schedule.jitter_unit_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AdversaryConfig::default();
        config.transmission.summary_every = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unavailable_attack() {
        let config = AdversaryConfig::for_profile(AttackProfile::SelectiveForwarding)
            .with_attack(AttackKind::ControlFlood, true);
        assert!(matches!(
            config.validate(),
            Err(AdversaryError::AttackUnavailable {
                attack: AttackKind::ControlFlood
            })
        ));
    }

    #[test]
    fn test_config_toml_round_trip() {
        let text = r#"
            capabilities = ["sinkhole", "selective_forwarding"]
            fake_identity = 42

            [attacks]
            sinkhole = true

            [schedule]
            base_interval_ms = 2000
            drop_rearm = { mode = "repeat_previous" }
        "#;
        let config: AdversaryConfig = toml::from_str(text).unwrap();
        assert!(config.attacks.sinkhole);
        assert!(!config.attacks.selective_forwarding);
        assert_eq!(config.fake_identity.value(), 42);
        assert_eq!(config.schedule.base_interval_ms, 2000);
        assert_eq!(config.schedule.jitter_unit_ms, 1000);
        assert_eq!(config.schedule.drop_rearm, DropRearm::RepeatPrevious);
        assert!(!config.capabilities.contains(AttackKind::ControlFlood));
        assert!(config.validate().is_ok());
    }
}

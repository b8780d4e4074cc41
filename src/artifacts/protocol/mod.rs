//! Git smart-protocol framing
//!
//! - `pkt_line`: length-prefixed packets and the flush/delim markers
//! - `side_band`: side-band-64k multiplexing of pack data and progress
//! - `capabilities`: capability flags exchanged in advertisements

pub mod capabilities;
pub mod pkt_line;
pub mod side_band;

use crate::artifacts::protocol::capabilities::{Capabilities, CapabilityList};
use crate::config::Config;

pub const UPLOAD_PACK_SERVICE: &str = "git-upload-pack";

pub const ADVERTISEMENT_CONTENT_TYPE: &str = "application/x-git-upload-pack-advertisement";

pub const REQUEST_CONTENT_TYPE: &str = "application/x-git-upload-pack-request";

pub const RESULT_CONTENT_TYPE: &str = "application/x-git-upload-pack-result";

/// Immutable protocol settings handed to the transport at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub agent: String,
    pub capabilities: Capabilities,
    pub max_ref_depth: usize,
    pub max_tree_depth: usize,
}

impl ProtocolConfig {
    pub fn from_config(config: &Config) -> Self {
        ProtocolConfig {
            agent: config.agent.clone(),
            capabilities: Capabilities::SIDE_BAND_64K | Capabilities::SHALLOW,
            max_ref_depth: config.max_ref_depth,
            max_tree_depth: config.max_tree_depth,
        }
    }

    /// Capabilities attached to the first advertised ref
    pub fn advertised(&self, head_target: Option<&str>) -> CapabilityList {
        let mut flags = self.capabilities;
        let symref = head_target.map(|target| {
            flags |= Capabilities::SYMREF;
            ("HEAD".to_string(), target.to_string())
        });

        CapabilityList {
            flags,
            symref,
            agent: Some(self.agent.clone()),
        }
    }

    /// Capabilities a client asks for in its first want line
    pub fn requested(&self) -> CapabilityList {
        CapabilityList {
            flags: Capabilities::SIDE_BAND_64K,
            symref: None,
            agent: Some(self.agent.clone()),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

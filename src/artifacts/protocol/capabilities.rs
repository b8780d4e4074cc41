use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        const SIDE_BAND_64K = 0b0001;
        const SHALLOW = 0b0010;
        const NO_PROGRESS = 0b0100;
        const SYMREF = 0b1000;
    }
}

impl Capabilities {
    pub fn try_parse_name(name: &str) -> Option<Self> {
        match name {
            "side-band-64k" => Some(Self::SIDE_BAND_64K),
            "shallow" => Some(Self::SHALLOW),
            "no-progress" => Some(Self::NO_PROGRESS),
            "symref" => Some(Self::SYMREF),
            _ => None,
        }
    }

    /// Wire names of the set flags, `symref` excluded since it carries a value
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.contains(Self::SIDE_BAND_64K) {
            names.push("side-band-64k");
        }
        if self.contains(Self::SHALLOW) {
            names.push("shallow");
        }
        if self.contains(Self::NO_PROGRESS) {
            names.push("no-progress");
        }
        names
    }
}

/// Capabilities as sent on the wire, with their values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityList {
    pub flags: Capabilities,
    /// `symref=<from>:<to>`
    pub symref: Option<(String, String)>,
    pub agent: Option<String>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::empty()
    }
}

impl CapabilityList {
    /// Parse a space-separated capability string; unknown names are ignored
    pub fn parse(raw: &str) -> Self {
        let mut list = CapabilityList::default();

        for token in raw.split_whitespace() {
            match token.split_once('=') {
                Some(("agent", agent)) => list.agent = Some(agent.to_string()),
                Some(("symref", value)) => {
                    if let Some((from, to)) = value.split_once(':') {
                        list.flags |= Capabilities::SYMREF;
                        list.symref = Some((from.to_string(), to.to_string()));
                    }
                }
                Some(_) => {}
                None => {
                    if let Some(flag) = Capabilities::try_parse_name(token) {
                        list.flags |= flag;
                    }
                }
            }
        }

        list
    }
}

impl std::fmt::Display for CapabilityList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tokens = self
            .flags
            .names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        if let Some((from, to)) = &self.symref {
            tokens.push(format!("symref={from}:{to}"));
        }
        if let Some(agent) = &self.agent {
            tokens.push(format!("agent={agent}"));
        }

        write!(f, "{}", tokens.join(" "))
    }
}

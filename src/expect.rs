use crate::model::{IsolationLevel, ProbeKind, ServerEra};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// Case-insensitive substring.
    Contains,
    /// Case-insensitive equality after trimming.
    Exact,
}

impl MatchRule {
    pub fn matches(&self, fragment: &str, statement: &str) -> bool {
        let fragment = fragment.trim().to_lowercase();
        let statement = statement.trim().to_lowercase();
        match self {
            MatchRule::Contains => statement.contains(&fragment),
            MatchRule::Exact => statement == fragment,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expectation {
    pub fragment: &'static str,
    pub rule: MatchRule,
}

/// Start statements issued per level on 5.7+ servers; the level itself goes
/// out in a separate `SET TRANSACTION` statement.
const MODERN_START: &[(IsolationLevel, &str)] = &[
    (
        IsolationLevel::Snapshot,
        "start transaction with consistent snapshot",
    ),
];

const DEFAULT_START: &str = "start transaction";

/// Pre-5.7 servers coalesce every isolation request into one statement.
const LEGACY_ISOLATION: &str = "serializable";

pub fn expectation(era: ServerEra, kind: ProbeKind, level: IsolationLevel) -> Expectation {
    let fragment = match (era, kind) {
        (ServerEra::Legacy, ProbeKind::Isolation) => LEGACY_ISOLATION,
        (ServerEra::Legacy, ProbeKind::Start) => DEFAULT_START,
        (ServerEra::Modern, ProbeKind::Isolation) => level.sql_name(),
        (ServerEra::Modern, ProbeKind::Start) => MODERN_START
            .iter()
            .find(|(l, _)| *l == level)
            .map(|(_, f)| *f)
            .unwrap_or(DEFAULT_START),
    };
    Expectation {
        fragment,
        rule: rule_for(era, kind),
    }
}

/// Match rule for a probe kind, shared by table fragments and caller-supplied
/// ones. Only 5.7+ start statements are compared whole.
pub fn rule_for(era: ServerEra, kind: ProbeKind) -> MatchRule {
    match (era, kind) {
        (ServerEra::Modern, ProbeKind::Start) => MatchRule::Exact,
        _ => MatchRule::Contains,
    }
}

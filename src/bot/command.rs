//! Command parsing: prefix, tokenization and the alias table.

use std::sync::LazyLock;

use regex::Regex;

pub const PREFIX: char = '!';

/// Vote target meaning "the whole group".
pub const WHOLE_GROUP_SENTINEL: &str = "-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    RestrictUser,
    YesKing,
    RemoveUser,
    VoteRemove,
    RemoveNuisance,
    Debug,
    SelfDestruct,
}

impl CommandKind {
    /// Whether only the operator may run this command.
    pub fn operator_only(self) -> bool {
        matches!(
            self,
            CommandKind::RestrictUser
                | CommandKind::RemoveNuisance
                | CommandKind::Debug
                | CommandKind::SelfDestruct
        )
    }
}

/// One entry of the alias table. `second` must match the first argument,
/// which is then consumed.
struct Alias {
    name: &'static str,
    second: Option<&'static str>,
    kind: CommandKind,
}

const ALIASES: &[Alias] = &[
    Alias { name: "restrictuser", second: None, kind: CommandKind::RestrictUser },
    Alias { name: "yesking", second: None, kind: CommandKind::YesKing },
    Alias { name: "removeuser", second: None, kind: CommandKind::RemoveUser },
    Alias { name: "voteremove", second: None, kind: CommandKind::VoteRemove },
    Alias { name: "debug", second: None, kind: CommandKind::Debug },
    Alias { name: "selfdestruct", second: None, kind: CommandKind::SelfDestruct },
    Alias { name: "begone", second: None, kind: CommandKind::RemoveNuisance },
    Alias { name: "shoo", second: None, kind: CommandKind::RemoveNuisance },
    Alias { name: "getout", second: None, kind: CommandKind::RemoveNuisance },
    Alias { name: "stfu", second: Some("pest"), kind: CommandKind::RemoveNuisance },
    Alias { name: "pest", second: Some("stfu"), kind: CommandKind::RemoveNuisance },
];

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub kind: CommandKind,
    pub args: Vec<String>,
}

/// Parse a message into a command. Returns `None` for anything that is not
/// a prefixed, known command.
pub fn parse(content: &str) -> Option<Invocation> {
    let rest = content.strip_prefix(PREFIX)?;
    let mut tokens = rest.split_whitespace();
    let name = tokens.next()?.to_lowercase();
    let args: Vec<String> = tokens.map(str::to_string).collect();

    let alias = ALIASES.iter().find(|a| {
        a.name == name
            && match a.second {
                None => true,
                Some(second) => args.first().is_some_and(|arg| arg.eq_ignore_ascii_case(second)),
            }
    })?;

    let args = if alias.second.is_some() { args[1..].to_vec() } else { args };
    Some(Invocation { kind: alias.kind, args })
}

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<@!?(\d+)>$").expect("mention pattern is valid"));

/// Parse a user argument given as a raw id or a mention.
pub fn parse_user(arg: &str) -> Option<u64> {
    let digits = MENTION
        .captures(arg)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(arg);
    digits.parse::<u64>().ok().filter(|id| *id != 0)
}

/// Target of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTarget {
    Member(u64),
    WholeGroup,
}

pub fn parse_vote_target(arg: &str) -> Option<VoteTarget> {
    if arg == WHOLE_GROUP_SENTINEL {
        return Some(VoteTarget::WholeGroup);
    }
    parse_user(arg).map(VoteTarget::Member)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignores_unprefixed() {
        assert_eq!(parse("removeuser 42"), None);
        assert_eq!(parse(""), None);
        assert_eq!(parse("!"), None);
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(parse("!dance now"), None);
    }

    #[test]
    fn test_case_insensitive_name() {
        let inv = parse("!RemoveUser 42").unwrap();
        assert_eq!(inv.kind, CommandKind::RemoveUser);
        assert_eq!(inv.args, vec!["42"]);
    }

    #[test]
    fn test_collapses_whitespace() {
        let inv = parse("!restrictuser   42  being   rude").unwrap();
        assert_eq!(inv.kind, CommandKind::RestrictUser);
        assert_eq!(inv.args, vec!["42", "being", "rude"]);
    }

    #[test]
    fn test_nuisance_aliases() {
        for line in ["!begone", "!SHOO", "!getout", "!stfu pest", "!pest stfu", "!Stfu PEST"] {
            let inv = parse(line).unwrap_or_else(|| panic!("{line} should parse"));
            assert_eq!(inv.kind, CommandKind::RemoveNuisance, "{line}");
            assert!(inv.args.is_empty(), "{line}");
        }
    }

    #[test]
    fn test_two_token_alias_needs_second_word() {
        assert_eq!(parse("!stfu"), None);
        assert_eq!(parse("!stfu everyone"), None);
        assert_eq!(parse("!pest"), None);
    }

    #[test]
    fn test_operator_only() {
        assert!(CommandKind::RestrictUser.operator_only());
        assert!(CommandKind::SelfDestruct.operator_only());
        assert!(CommandKind::Debug.operator_only());
        assert!(CommandKind::RemoveNuisance.operator_only());
        assert!(!CommandKind::RemoveUser.operator_only());
        assert!(!CommandKind::YesKing.operator_only());
        assert!(!CommandKind::VoteRemove.operator_only());
    }

    #[test]
    fn test_parse_user() {
        assert_eq!(parse_user("42"), Some(42));
        assert_eq!(parse_user("<@42>"), Some(42));
        assert_eq!(parse_user("<@!42>"), Some(42));
        assert_eq!(parse_user("<@abc>"), None);
        assert_eq!(parse_user("someone"), None);
        assert_eq!(parse_user("0"), None);
        assert_eq!(parse_user("-1"), None);
    }

    #[test]
    fn test_parse_vote_target() {
        assert_eq!(parse_vote_target("-1"), Some(VoteTarget::WholeGroup));
        assert_eq!(parse_vote_target("<@9>"), Some(VoteTarget::Member(9)));
        assert_eq!(parse_vote_target("x"), None);
    }
}

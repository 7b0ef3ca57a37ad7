//! Chat command parsing.
//!
//! A message is split on whitespace. The first token is the command, which may
//! carry a `@BotName` suffix (`/add@roster_bot`); the suffix is ignored.
//! Usernames lose one leading `@`.

use thiserror::Error;

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  Start,
  Help,
  Add { username: String, tags: Vec<String> },
  AddTag { username: String, tag: String },
  AddTags { username: String, tags: Vec<String> },
  Delete { username: String },
  Show { username: String },
  Random { tags: Vec<String> },
  List,
  ListByTag { tag: String },
  ListByTags { tags: Vec<String> },
}

/// Why a message could not be turned into a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
  #[error("message is not a command")]
  NotACommand,

  #[error("unknown command: /{0}")]
  Unknown(String),

  /// Recognised command with missing arguments; carries the usage line.
  #[error("{0}")]
  Usage(&'static str),
}

pub const USAGE_ADD: &str = "Please provide a username: /add @username [tags...]";
pub const USAGE_ADD_TAG: &str = "Please provide a username and a tag: /add_tag @username tag";
pub const USAGE_ADD_TAGS: &str =
  "Please provide a username and at least one tag: /add_tags @username tag1 tag2 ...";
pub const USAGE_DELETE: &str = "Please provide a username: /delete @username";
pub const USAGE_SHOW: &str = "Please provide a username: /show @username";
pub const USAGE_LIST_BY_TAG: &str = "Please provide a tag: /list_by_tag tag";
pub const USAGE_LIST_BY_TAGS: &str =
  "Please provide at least one tag: /list_by_tags tag1 [tag2 tag3 ...]";

/// Strip one leading `@` from a username token.
pub fn normalize_username(token: &str) -> &str { token.strip_prefix('@').unwrap_or(token) }

impl Command {
  pub fn parse(text: &str) -> Result<Self, ParseError> {
    let mut tokens = text.split_whitespace();
    let head = tokens.next().ok_or(ParseError::NotACommand)?;
    let name = head.strip_prefix('/').ok_or(ParseError::NotACommand)?;
    let name = name.split_once('@').map_or(name, |(n, _bot)| n);
    let args: Vec<&str> = tokens.collect();

    let username = |usage| {
      args
        .first()
        .map(|t| normalize_username(t))
        .filter(|u| !u.is_empty())
        .map(str::to_owned)
        .ok_or(ParseError::Usage(usage))
    };
    let rest = |from: usize| -> Vec<String> {
      args.iter().skip(from).map(|t| t.to_string()).collect()
    };

    Ok(match name {
      "start" => Self::Start,
      "help" => Self::Help,
      "add" => Self::Add { username: username(USAGE_ADD)?, tags: rest(1) },
      "add_tag" => {
        let username = username(USAGE_ADD_TAG)?;
        let tag = args.get(1).ok_or(ParseError::Usage(USAGE_ADD_TAG))?.to_string();
        Self::AddTag { username, tag }
      }
      "add_tags" => {
        let username = username(USAGE_ADD_TAGS)?;
        let tags = rest(1);
        if tags.is_empty() {
          return Err(ParseError::Usage(USAGE_ADD_TAGS));
        }
        Self::AddTags { username, tags }
      }
      "delete" => Self::Delete { username: username(USAGE_DELETE)? },
      "show" => Self::Show { username: username(USAGE_SHOW)? },
      "random" => Self::Random { tags: rest(0) },
      "list" => Self::List,
      "list_by_tag" => Self::ListByTag {
        tag: args.first().ok_or(ParseError::Usage(USAGE_LIST_BY_TAG))?.to_string(),
      },
      "list_by_tags" => {
        let tags = rest(0);
        if tags.is_empty() {
          return Err(ParseError::Usage(USAGE_LIST_BY_TAGS));
        }
        Self::ListByTags { tags }
      }
      other => return Err(ParseError::Unknown(other.to_owned())),
    })
  }
}

//! Executes parsed commands against a [`RecordStore`] and renders the reply.
//!
//! Replies use Telegram-style HTML: user-supplied text is escaped and
//! usernames are wrapped in `<b>`.

use roster_core::{record::Record, store::RecordStore};
use tracing::debug;

use crate::{
  command::{Command, ParseError},
  error::Error,
};

/// Reply sent when the store fails for a reason the user cannot fix.
pub const FAILURE_REPLY: &str = "Something went wrong, please try again later.";

pub const HELP: &str = "Available commands:\n\
/add @username [tags...] - Add a person to the database with optional tags\n\
/delete @username - Delete a person from the database\n\
/show @username - Show a person and their tags\n\
/random [tags] - Get a random person (optionally having any of the tags)\n\
/add_tag @username tag - Add a tag to a person\n\
/add_tags @username tag1 tag2 ... - Add multiple tags to a person\n\
/list - List all persons in the database\n\
/list_by_tag tag - List all persons that have the tag\n\
/list_by_tags tag1 tag2 ... - List all persons that have ALL the specified tags";

// ─── Rendering helpers ───────────────────────────────────────────────────────

pub fn escape_html(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      c => out.push(c),
    }
  }
  out
}

fn bold(s: &str) -> String { format!("<b>{}</b>", escape_html(s)) }

fn tag_list(tags: &[String]) -> String {
  if tags.is_empty() {
    "no tags".to_owned()
  } else {
    tags.iter().map(|t| escape_html(t)).collect::<Vec<_>>().join(", ")
  }
}

fn quoted_tags(tags: &[String]) -> String {
  tags.iter().map(|t| format!("'{}'", bold(t))).collect::<Vec<_>>().join(", ")
}

fn bullets(header: &str, persons: &[Record], with_tags: bool) -> String {
  let mut out = format!("{header}\n\n");
  for person in persons {
    if with_tags {
      out.push_str(&format!("• {} (tags: {})\n", bold(&person.username), tag_list(&person.tags)));
    } else {
      out.push_str(&format!("• {}\n", bold(&person.username)));
    }
  }
  out
}

fn not_found(username: &str) -> String {
  format!("Person {} not found in database.", bold(username))
}

fn store_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
  Error::Store(Box::new(e))
}

/// Reply for a tag mutation that changed nothing: either the person is
/// missing or already had the tags.
async fn unchanged<S: RecordStore>(store: &S, username: &str, what: &str) -> Result<String, Error> {
  let exists = store.get_person(username).await.map_err(store_err)?.is_some();
  Ok(if exists {
    format!("{} already has {what}.", bold(username))
  } else {
    not_found(username)
  })
}

// ─── Entry points ────────────────────────────────────────────────────────────

/// Parse `text` and execute it. Parse failures become replies, not errors.
pub async fn respond<S: RecordStore>(
  store: &S,
  text: &str,
  sender: Option<&str>,
) -> Result<String, Error> {
  match Command::parse(text) {
    Ok(command) => execute(store, &command, sender).await,
    Err(ParseError::Usage(usage)) => Ok(usage.to_owned()),
    Err(ParseError::Unknown(name)) => Ok(format!(
      "Unknown command <code>/{}</code>. Use /help to see available commands.",
      escape_html(&name)
    )),
    Err(ParseError::NotACommand) => Ok("Send me a command, e.g. /help.".to_owned()),
  }
}

pub async fn execute<S: RecordStore>(
  store: &S,
  command: &Command,
  sender: Option<&str>,
) -> Result<String, Error> {
  debug!(?command, "executing command");

  match command {
    Command::Start => Ok(format!(
      "Hello, {}!\nWelcome to Random Person Bot!\nUse /help to see available commands.",
      bold(sender.unwrap_or("there"))
    )),

    Command::Help => Ok(HELP.to_owned()),

    Command::Add { username, tags } => match store.add_person(username, tags).await {
      Ok(person) => Ok(format!(
        "Added {} to the database with tags: {}",
        bold(&person.username),
        tag_list(&person.tags)
      )),
      Err(e) => {
        let rejected = roster_core::Error::find_in(&e)
          .filter(|core| {
            matches!(
              core,
              roster_core::Error::DuplicateUsername(_) | roster_core::Error::EmptyUsername
            )
          })
          .map(ToString::to_string);
        match rejected {
          Some(reason) => Ok(format!("Error adding person: {}", escape_html(&reason))),
          None => Err(store_err(e)),
        }
      }
    },

    Command::AddTag { username, tag } => {
      if store.add_tag(username, tag).await.map_err(store_err)? {
        Ok(format!("Added tag '{}' to {}!", bold(tag), bold(username)))
      } else {
        unchanged(store, username, "that tag").await
      }
    }

    Command::AddTags { username, tags } => {
      if store.add_tags(username, tags).await.map_err(store_err)? {
        Ok(format!("Added tags '{}' to {}!", bold(&tags.join(", ")), bold(username)))
      } else {
        unchanged(store, username, "all of these tags").await
      }
    }

    Command::Delete { username } => {
      if store.delete_person(username).await.map_err(store_err)? {
        Ok(format!("Deleted {} from the database!", bold(username)))
      } else {
        Ok(not_found(username))
      }
    }

    Command::Show { username } => match store.get_person(username).await.map_err(store_err)? {
      Some(person) => Ok(format!(
        "{}\nTags: {}\nAdded: {}",
        bold(&person.username),
        tag_list(&person.tags),
        person.created_at.format("%Y-%m-%d")
      )),
      None => Ok(not_found(username)),
    },

    Command::Random { tags } => match store.get_random_person(tags).await.map_err(store_err)? {
      Some(person) => Ok(format!(
        "Random person: {}\nTags: {}",
        bold(&person.username),
        tag_list(&person.tags)
      )),
      None => Ok("No matching persons found in database.".to_owned()),
    },

    Command::List => {
      let persons = store.get_all_persons().await.map_err(store_err)?;
      if persons.is_empty() {
        return Ok("No persons found in database.".to_owned());
      }
      Ok(bullets("Persons in database:", &persons, true))
    }

    Command::ListByTag { tag } => {
      let persons = store.get_all_persons_by_tag(tag).await.map_err(store_err)?;
      if persons.is_empty() {
        return Ok(format!("No persons found with tag '{}'.", bold(tag)));
      }
      Ok(bullets(&format!("Persons with tag '{}':", bold(tag)), &persons, true))
    }

    Command::ListByTags { tags } => {
      let persons = store.get_all_persons_by_tags(tags).await.map_err(store_err)?;
      if persons.is_empty() {
        return Ok(format!("No persons found with all tags: {}", quoted_tags(tags)));
      }
      Ok(bullets(&format!("Persons with all tags {}:", quoted_tags(tags)), &persons, false))
    }
  }
}

#[cfg(test)]
mod tests {
  use roster_store_sqlite::{SqliteStore, StoreOptions};

  use super::*;

  async fn store() -> SqliteStore {
    let s = SqliteStore::open_in_memory(StoreOptions::default()).await.unwrap();
    s.initialize().await.unwrap();
    s
  }

  async fn say(store: &SqliteStore, text: &str) -> String {
    respond(store, text, None).await.unwrap()
  }

  #[test]
  fn escapes_html_metacharacters() {
    assert_eq!(escape_html("<b>&\"x\"</b>"), "&lt;b&gt;&amp;&quot;x&quot;&lt;/b&gt;");
  }

  #[tokio::test]
  async fn start_greets_sender() {
    let s = store().await;
    let reply = respond(&s, "/start", Some("Ada")).await.unwrap();
    assert!(reply.starts_with("Hello, <b>Ada</b>!"), "{reply}");
  }

  #[tokio::test]
  async fn add_then_duplicate() {
    let s = store().await;
    assert_eq!(
      say(&s, "/add @alice developer python").await,
      "Added <b>alice</b> to the database with tags: developer, python"
    );
    assert_eq!(
      say(&s, "/add bob").await,
      "Added <b>bob</b> to the database with tags: no tags"
    );
    assert_eq!(
      say(&s, "/add alice").await,
      "Error adding person: person with username alice already exists"
    );
  }

  #[tokio::test]
  async fn tag_commands_distinguish_missing_from_unchanged() {
    let s = store().await;
    say(&s, "/add @alice").await;

    assert_eq!(say(&s, "/add_tag @alice dev").await, "Added tag '<b>dev</b>' to <b>alice</b>!");
    assert_eq!(say(&s, "/add_tag @alice dev").await, "<b>alice</b> already has that tag.");
    assert_eq!(
      say(&s, "/add_tags @alice dev ops").await,
      "Added tags '<b>dev, ops</b>' to <b>alice</b>!"
    );
    assert_eq!(
      say(&s, "/add_tags @alice ops dev").await,
      "<b>alice</b> already has all of these tags."
    );
    assert_eq!(
      say(&s, "/add_tags @ghost x").await,
      "Person <b>ghost</b> not found in database."
    );
  }

  #[tokio::test]
  async fn delete_and_show() {
    let s = store().await;
    say(&s, "/add @alice dev").await;

    let shown = say(&s, "/show alice").await;
    assert!(shown.starts_with("<b>alice</b>\nTags: dev\nAdded: "), "{shown}");

    assert_eq!(say(&s, "/delete @alice").await, "Deleted <b>alice</b> from the database!");
    assert_eq!(say(&s, "/delete @alice").await, "Person <b>alice</b> not found in database.");
    assert_eq!(say(&s, "/show alice").await, "Person <b>alice</b> not found in database.");
  }

  #[tokio::test]
  async fn random_and_lists() {
    let s = store().await;
    assert_eq!(say(&s, "/random").await, "No matching persons found in database.");
    assert_eq!(say(&s, "/list").await, "No persons found in database.");

    say(&s, "/add @user1 developer python backend").await;
    say(&s, "/add @user4 designer ux").await;

    assert_eq!(
      say(&s, "/random developer").await,
      "Random person: <b>user1</b>\nTags: developer, python, backend"
    );
    assert_eq!(
      say(&s, "/list").await,
      "Persons in database:\n\n\
       • <b>user1</b> (tags: developer, python, backend)\n\
       • <b>user4</b> (tags: designer, ux)\n"
    );
    assert_eq!(
      say(&s, "/list_by_tag ux").await,
      "Persons with tag '<b>ux</b>':\n\n• <b>user4</b> (tags: designer, ux)\n"
    );
    assert_eq!(
      say(&s, "/list_by_tags backend python").await,
      "Persons with all tags '<b>backend</b>', '<b>python</b>':\n\n• <b>user1</b>\n"
    );
    assert_eq!(
      say(&s, "/list_by_tags python ux").await,
      "No persons found with all tags: '<b>python</b>', '<b>ux</b>'"
    );
  }

  #[tokio::test]
  async fn user_text_is_escaped() {
    let s = store().await;
    assert_eq!(
      say(&s, "/add <script> a&b").await,
      "Added <b>&lt;script&gt;</b> to the database with tags: a&amp;b"
    );
  }

  #[tokio::test]
  async fn parse_failures_become_replies() {
    let s = store().await;
    assert_eq!(say(&s, "/delete").await, crate::command::USAGE_DELETE);
    assert_eq!(
      say(&s, "/nope").await,
      "Unknown command <code>/nope</code>. Use /help to see available commands."
    );
    assert_eq!(say(&s, "hi").await, "Send me a command, e.g. /help.");
    assert_eq!(say(&s, "/help").await, HELP);
  }
}

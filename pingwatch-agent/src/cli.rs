//! Command line parsing

use anyhow::{bail, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Monitor until interrupted
    Run,
    ShowSettings,
    SetCloseToTray(bool),
    Help,
}

pub const USAGE: &str = "\
usage: pingwatch [command]

commands:
  run                               monitor configured hosts (default)
  settings show                     print runtime settings
  settings set close-to-tray <bool> store the close-to-tray preference
  help                              print this message

environment:
  PINGWATCH_CONFIG   config file path (default pingwatch.yaml)
  PINGWATCH_REPORT_SECS  status report interval in seconds (default 10)
  PINGWATCH_REPORT_JSON  print status reports as JSON lines on stdout (1/true/yes)
  RUST_LOG           log filter (default pingwatch=info)";

impl Command {
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        let words: Vec<&str> = args.iter().map(String::as_str).collect();

        match words.as_slice() {
            [] | ["run"] => Ok(Command::Run),
            ["help"] | ["-h"] | ["--help"] => Ok(Command::Help),
            ["settings"] | ["settings", "show"] => Ok(Command::ShowSettings),
            ["settings", "set", "close-to-tray" | "close_to_tray", value] => {
                Ok(Command::SetCloseToTray(parse_bool(value)?))
            }
            _ => bail!("unrecognised arguments: {}\n\n{}", words.join(" "), USAGE),
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => bail!("expected true or false, got '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_run() {
        assert_eq!(Command::parse(Vec::<String>::new()).unwrap(), Command::Run);
        assert_eq!(Command::parse(["run"]).unwrap(), Command::Run);
    }

    #[test]
    fn test_settings_commands() {
        assert_eq!(Command::parse(["settings"]).unwrap(), Command::ShowSettings);
        assert_eq!(
            Command::parse(["settings", "set", "close-to-tray", "no"]).unwrap(),
            Command::SetCloseToTray(false)
        );
        assert_eq!(
            Command::parse(["settings", "set", "close_to_tray", "TRUE"]).unwrap(),
            Command::SetCloseToTray(true)
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Command::parse(["settings", "set", "close-to-tray", "maybe"]).is_err());
        assert!(Command::parse(["frobnicate"]).is_err());
    }
}

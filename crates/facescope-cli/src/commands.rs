//! Interactive commands read from stdin by `facescope run`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open(String),
    Play,
    Pause,
    Resize(u32),
    Status,
    /// Retry model loading after a failure.
    Load,
    Help,
    Quit,
}

pub const HELP: &str = "commands: open <path.mp4> | play | pause | resize <width> | status | load | help | quit";

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "open" if rest.is_empty() => return Err("open needs a path".into()),
            "open" => Command::Open(rest.to_string()),
            "play" => Command::Play,
            "pause" => Command::Pause,
            "resize" => {
                let width = rest
                    .parse()
                    .map_err(|_| format!("resize needs a width in pixels, got {rest:?}"))?;
                Command::Resize(width)
            }
            "status" => Command::Status,
            "load" => Command::Load,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("unknown command {other:?}; {HELP}")),
        };
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("play").unwrap(), Some(Command::Play));
        assert_eq!(Command::parse("  PAUSE ").unwrap(), Some(Command::Pause));
        assert_eq!(Command::parse("resize 800").unwrap(), Some(Command::Resize(800)));
        assert_eq!(Command::parse("q").unwrap(), Some(Command::Quit));
        assert_eq!(Command::parse("").unwrap(), None);
    }

    #[test]
    fn test_open_keeps_spaces_in_path() {
        assert_eq!(
            Command::parse("open /videos/my clip.mp4").unwrap(),
            Some(Command::Open("/videos/my clip.mp4".into()))
        );
        assert!(Command::parse("open").is_err());
    }

    #[test]
    fn test_bad_input() {
        assert!(Command::parse("resize wide").is_err());
        assert!(Command::parse("resize -3").is_err());
        assert!(Command::parse("rewind").unwrap_err().contains("unknown command"));
    }
}

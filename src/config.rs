use std::ffi::OsString;
use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};

/// Startup settings for the bring-up window.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub vertex_path: PathBuf,
    pub fragment_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub clear_color: [f32; 4],
    /// `env_logger` filter; falls back to `RUST_LOG`.
    pub log_filter: Option<String>,
    /// Abort startup when the shaders do not build cleanly.
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vertex_path: PathBuf::from("shaders/vertex.glsl"),
            fragment_path: PathBuf::from("shaders/fragment.glsl"),
            width: 800,
            height: 600,
            title: "quad bringup".to_string(),
            clear_color: [0.1, 0.1, 0.1, 1.0],
            log_filter: None,
            strict: false,
        }
    }
}

impl Config {
    pub fn command() -> Command {
        Command::new("quad_bringup")
            .about("Opens a window and draws a quad with a vertex/fragment shader pair")
            .arg(
                Arg::new("vertex")
                    .long("vertex")
                    .value_name("PATH")
                    .help("Vertex shader source [default: shaders/vertex.glsl]")
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                Arg::new("fragment")
                    .long("fragment")
                    .value_name("PATH")
                    .help("Fragment shader source [default: shaders/fragment.glsl]")
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                Arg::new("width")
                    .long("width")
                    .help("Window width in logical pixels [default: 800]")
                    .value_parser(value_parser!(u32).range(1..)),
            )
            .arg(
                Arg::new("height")
                    .long("height")
                    .help("Window height in logical pixels [default: 600]")
                    .value_parser(value_parser!(u32).range(1..)),
            )
            .arg(Arg::new("title").long("title").help("Window title"))
            .arg(
                Arg::new("clear-color")
                    .long("clear-color")
                    .value_name("R,G,B[,A]")
                    .help("Background color, components in 0..=1")
                    .value_parser(parse_color),
            )
            .arg(
                Arg::new("log")
                    .long("log")
                    .value_name("FILTER")
                    .help("Log filter, e.g. \"debug\" or \"quad_bringup=trace\""),
            )
            .arg(
                Arg::new("strict")
                    .long("strict")
                    .help("Exit if a shader fails to read, compile or link")
                    .action(ArgAction::SetTrue),
            )
    }

    /// Parses the process arguments, exiting with usage on error.
    pub fn from_args() -> Self {
        Self::try_parse_from(std::env::args_os()).unwrap_or_else(|e| e.exit())
    }

    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let defaults = Self::default();

        Ok(Self {
            vertex_path: matches
                .get_one::<PathBuf>("vertex")
                .cloned()
                .unwrap_or(defaults.vertex_path),
            fragment_path: matches
                .get_one::<PathBuf>("fragment")
                .cloned()
                .unwrap_or(defaults.fragment_path),
            width: matches.get_one::<u32>("width").copied().unwrap_or(defaults.width),
            height: matches.get_one::<u32>("height").copied().unwrap_or(defaults.height),
            title: matches
                .get_one::<String>("title")
                .cloned()
                .unwrap_or(defaults.title),
            clear_color: matches
                .get_one::<[f32; 4]>("clear-color")
                .copied()
                .unwrap_or(defaults.clear_color),
            log_filter: matches.get_one::<String>("log").cloned(),
            strict: matches.get_flag("strict"),
        })
    }
}

fn parse_color(value: &str) -> Result<[f32; 4], String> {
    let components = value
        .split(',')
        .map(|c| {
            let c = c.trim();
            let parsed: f32 = c.parse().map_err(|_| format!("`{c}` is not a number"))?;
            if (0.0..=1.0).contains(&parsed) {
                Ok(parsed)
            } else {
                Err(format!("`{c}` is outside 0..=1"))
            }
        })
        .collect::<Result<Vec<f32>, String>>()?;

    match components[..] {
        [r, g, b] => Ok([r, g, b, 1.0]),
        [r, g, b, a] => Ok([r, g, b, a]),
        _ => Err(format!("expected 3 or 4 components, got {}", components.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_gives_defaults() {
        assert_eq!(Config::try_parse_from(["quad_bringup"]).unwrap(), Config::default());
    }

    #[test]
    fn arguments_override_defaults() {
        let config = Config::try_parse_from([
            "quad_bringup",
            "--vertex",
            "a.vert",
            "--fragment",
            "b.frag",
            "--width",
            "1024",
            "--height",
            "768",
            "--title",
            "hello",
            "--clear-color",
            "0, 0.5, 1",
            "--log",
            "debug",
            "--strict",
        ])
        .unwrap();

        assert_eq!(config.vertex_path, PathBuf::from("a.vert"));
        assert_eq!(config.fragment_path, PathBuf::from("b.frag"));
        assert_eq!((config.width, config.height), (1024, 768));
        assert_eq!(config.title, "hello");
        assert_eq!(config.clear_color, [0.0, 0.5, 1.0, 1.0]);
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
        assert!(config.strict);
    }

    #[test]
    fn zero_width_is_rejected() {
        assert!(Config::try_parse_from(["quad_bringup", "--width", "0"]).is_err());
    }

    #[test]
    fn color_parsing() {
        assert_eq!(parse_color("0.2,0.3,0.3,1.0"), Ok([0.2, 0.3, 0.3, 1.0]));
        assert!(parse_color("0.2,0.3").is_err());
        assert!(parse_color("0.2,0.3,1.5").is_err());
        assert!(parse_color("red,0,0").is_err());
    }
}

use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

const RC_ENV_VAR: &str = "CALENDULARC";
const RC_FILE_NAME: &str = ".calendularc";

const KNOWN_KEYS: [&str; 4] = [
  "data.location",
  "default.calendar",
  "view.past",
  "color"
];

/// Raw `key = value` pairs from
/// defaults, the rc file and
/// overrides, in that order.
#[derive(Debug, Clone)]
pub struct Config {
  map:        HashMap<String, String>,
  pub source: Option<PathBuf>
}

/// The recognised keys, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
  pub data_location:    PathBuf,
  pub default_calendar: u64,
  pub view_past:        bool,
  pub color:            bool
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::defaults();

    let Some(path) =
      locate_rc_file(rc_override)
    else {
      debug!(
        "no rc file found; using \
         defaults"
      );
      return Ok(cfg);
    };

    info!(rc = %path.display(), "loading rc file");
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    cfg.read_pairs(&path, &text)?;
    cfg.source = Some(path);
    Ok(cfg)
  }

  pub fn defaults() -> Self {
    let map = [
      ("data.location", "~/.calendula"),
      ("default.calendar", "1"),
      ("view.past", "on"),
      ("color", "on")
    ]
    .into_iter()
    .map(|(k, v)| {
      (k.to_string(), v.to_string())
    })
    .collect();

    Config {
      map,
      source: None
    }
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<&str> {
    self
      .map
      .get(key)
      .map(String::as_str)
  }

  /// Parses every recognised key;
  /// the first bad value is an
  /// error naming the key.
  pub fn settings(
    &self
  ) -> anyhow::Result<Settings> {
    let raw = |key: &str| {
      self.get(key).unwrap_or_default()
    };
    let switch = |key: &str| {
      parse_bool(raw(key)).ok_or_else(
        || {
          anyhow!(
            "invalid value for \
             {key}: {}",
            raw(key)
          )
        }
      )
    };

    let default_calendar = raw(
      "default.calendar"
    )
    .trim()
    .parse::<u64>()
    .map_err(|err| {
      anyhow!(
        "invalid value for \
         default.calendar: {}: {err}",
        raw("default.calendar")
      )
    })?;

    Ok(Settings {
      data_location: expand_home(
        Path::new(
          raw("data.location").trim()
        )
      ),
      default_calendar,
      view_past: switch("view.past")?,
      color: switch("color")?
    })
  }

  fn read_pairs(
    &mut self,
    path: &Path,
    text: &str
  ) -> anyhow::Result<()> {
    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = raw_line
        .split_once('#')
        .map_or(raw_line, |(before, _)| {
          before
        })
        .trim();
      if line.is_empty() {
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      if !KNOWN_KEYS
        .contains(&key.as_str())
      {
        warn!(key = %key, line = line_num + 1, "unknown config key; ignored");
        continue;
      }
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

/// `--data` wins over
/// `data.location`.
pub fn resolve_data_dir(
  settings: &Settings,
  override_dir: Option<&Path>
) -> PathBuf {
  override_dir
    .map(Path::to_path_buf)
    .unwrap_or_else(|| {
      settings.data_location.clone()
    })
}

/// `--rc-file`, then
/// `$CALENDULARC` (`/dev/null`
/// disables), then `~/.calendularc`.
fn locate_rc_file(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(expand_home(path));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    return (rc_env != "/dev/null")
      .then(|| {
        expand_home(Path::new(&rc_env))
      });
  }

  let candidate = dirs::home_dir()?
    .join(RC_FILE_NAME);
  candidate
    .exists()
    .then_some(candidate)
}

fn expand_home(
  path: &Path
) -> PathBuf {
  match (
    path.strip_prefix("~"),
    dirs::home_dir()
  ) {
    | (Ok(rest), Some(home)) => {
      home.join(rest)
    }
    | _ => path.to_path_buf()
  }
}

pub fn parse_bool(
  s: &str
) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

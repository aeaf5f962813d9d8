use std::path::PathBuf;

use serde_json::{Value, json};

use crate::{
    config::{GraphConfig, StorageKind},
    errors::GraphDbError,
    graph::GraphDb,
    query::{MapOptions, Query},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandLineConfig {
    pub dir: Option<PathBuf>,
    pub name: Option<String>,
    pub command: String,
    pub id: Option<String>,
    pub data: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub query: Option<String>,
    pub max_depth: Option<u32>,
}

impl CommandLineConfig {
    pub fn from_args(args: &[&str]) -> Result<Self, String> {
        let mut cfg = Self {
            command: String::from("status"),
            ..Self::default()
        };
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            let mut value = |flag: &str| {
                iter.next()
                    .map(|v| v.to_string())
                    .ok_or_else(|| format!("{flag} requires a value"))
            };
            match *arg {
                "--dir" => cfg.dir = Some(PathBuf::from(value("--dir")?)),
                "--name" => cfg.name = Some(value("--name")?),
                "--command" => cfg.command = value("--command")?,
                "--id" => cfg.id = Some(value("--id")?),
                "--data" => cfg.data = Some(value("--data")?),
                "--from" => cfg.from = Some(value("--from")?),
                "--to" => cfg.to = Some(value("--to")?),
                "--query" => cfg.query = Some(value("--query")?),
                "--max-depth" => {
                    let raw = value("--max-depth")?;
                    cfg.max_depth = Some(
                        raw.parse()
                            .map_err(|_| format!("--max-depth expects a number, got {raw}"))?,
                    );
                }
                other if other.starts_with('-') => {
                    return Err(format!("unknown flag {other}"));
                }
                other => cfg.command = other.to_string(),
            }
        }
        cfg.check_required()?;
        Ok(cfg)
    }

    fn check_required(&self) -> Result<(), String> {
        let require = |present: bool, flag: &str| {
            if present {
                Ok(())
            } else {
                Err(format!("{} requires {flag}", self.command))
            }
        };
        match self.command.as_str() {
            "put" | "get" | "remove" => require(self.id.is_some(), "--id"),
            "link" => {
                require(self.from.is_some(), "--from")?;
                require(self.to.is_some(), "--to")
            }
            "status" | "map" | "oplog" | "clear" => Ok(()),
            other => Err(format!("unknown command {other}")),
        }
    }

    /// Environment defaults overlaid with `--dir` and `--name`.
    pub fn graph_config(&self) -> Result<GraphConfig, GraphDbError> {
        let mut config = GraphConfig::from_env()?;
        if let Some(dir) = &self.dir {
            config.storage = StorageKind::File { dir: dir.clone() };
        }
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        Ok(config)
    }

    pub fn help() -> &'static str {
        "Usage: genosdb [--dir PATH] [--name NAME] --command status|put|get|link|remove|map|oplog|clear\n\
         \x20      [--id ID] [--data JSON] [--from ID] [--to ID] [--query JSON] [--max-depth N]\n"
    }
}

/// Executes one command and returns its JSON output.
pub fn run_command(db: &GraphDb, cfg: &CommandLineConfig) -> Result<Value, GraphDbError> {
    match cfg.command.as_str() {
        "status" => to_json(&db.stats()),
        "put" => {
            let record = db.put(required(&cfg.id, "--id")?, parse_json(cfg.data.as_deref())?)?;
            to_json(&record)
        }
        "get" => to_json(&db.get(required(&cfg.id, "--id")?)),
        "link" => {
            let edge = db.link(
                required(&cfg.from, "--from")?,
                required(&cfg.to, "--to")?,
                parse_json(cfg.data.as_deref())?,
            )?;
            to_json(&edge)
        }
        "remove" => Ok(json!({ "removed": db.remove(required(&cfg.id, "--id")?) })),
        "map" => {
            let query = Query::from_json(&parse_json(cfg.query.as_deref())?)?;
            let options = MapOptions {
                max_depth: cfg.max_depth,
                callback: None,
            };
            to_json(&db.map_with(&query, options)?.nodes)
        }
        "oplog" => to_json(&db.oplog()),
        "clear" => {
            db.clear();
            Ok(json!({ "cleared": true }))
        }
        other => Err(GraphDbError::invalid_input(format!("unknown command {other}"))),
    }
}

fn required<'a>(value: &'a Option<String>, flag: &str) -> Result<&'a str, GraphDbError> {
    value
        .as_deref()
        .ok_or_else(|| GraphDbError::invalid_input(format!("{flag} is required")))
}

fn parse_json(raw: Option<&str>) -> Result<Value, GraphDbError> {
    match raw {
        None => Ok(Value::Null),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| GraphDbError::invalid_input(format!("invalid JSON {text}: {e}"))),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, GraphDbError> {
    serde_json::to_value(value).map_err(|e| GraphDbError::codec(e.to_string()))
}

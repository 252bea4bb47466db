//! # Boost.Test Protocol Module / Boost.Test 协议模块
//!
//! Command-line arguments for the two invocation modes of a Boost.Test
//! binary, and parsers for their output:
//!
//! - list mode, `--list_content=DOT`, prints the test tree as a graphviz
//!   digraph whose node labels are `name|file(line)`;
//! - run mode, `--log_format=HRF --log_level=test_suite`, prints one
//!   `Entering`/`Leaving` line per unit plus `error: in "path": ...` lines.
//!
//! Only this subset of the output grammar is understood.
//!
//! Boost.Test 二进制文件两种调用模式的命令行参数及其输出解析器。

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::ParseError;
use crate::core::item::SourceLocation;
use crate::core::models::TestMessage;

static NODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(tu\d+)\[([^\]]*)\]").expect("node regex is valid"));
static EDGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(tu\d+)\s*->\s*(tu\d+)").expect("edge regex is valid"));
static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"label="((?:[^"\\]|\\.)*)""#).expect("label regex is valid"));
static COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"color=(\w+)").expect("color regex is valid"));
static LOCATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)\((\d+)\)$").expect("location regex is valid"));

static PREFIX: &str = r"^(?:(?P<file>.+?)\((?P<line>\d+)\): )?";
static ENTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r#"{PREFIX}Entering test (?P<unit>module|suite|case) "(?P<name>[^"]*)""#))
        .expect("enter regex is valid")
});
static LEAVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"{PREFIX}Leaving test (?P<unit>module|suite|case) "(?P<name>[^"]*)"(?:; testing time: (?P<time>\d+)(?P<tu>mks|us|ms|s)\b)?"#
    ))
    .expect("leave regex is valid")
});
static ERROR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"{PREFIX}(?:fatal error|error): in "(?P<path>[^"]*)": (?P<msg>.*)$"#
    ))
    .expect("error regex is valid")
});
static SKIP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"{PREFIX}Test (?P<unit>case|suite) "(?P<path>[^"]*)" is skipped because (?P<why>.*)$"#
    ))
    .expect("skip regex is valid")
});

/// Arguments that make the binary print its test tree.
pub fn list_args() -> Vec<String> {
    vec!["--list_content=DOT".to_string()]
}

/// Arguments that run `test_paths` (all tests when empty) with a log the
/// [`RunLogParser`] understands.
pub fn run_args(test_paths: &[&str]) -> Vec<String> {
    let mut args = vec![
        "--log_format=HRF".to_string(),
        "--log_level=test_suite".to_string(),
        "--report_level=no".to_string(),
        "--color_output=no".to_string(),
    ];
    args.extend(run_test_args(test_paths));
    args
}

/// Arguments for running `test_paths` under a debugger: system errors are
/// left to the debugger.
pub fn debug_args(test_paths: &[&str]) -> Vec<String> {
    let mut args = vec!["--catch_system_errors=no".to_string()];
    args.extend(run_test_args(test_paths));
    args
}

fn run_test_args(test_paths: &[&str]) -> Vec<String> {
    test_paths
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| format!("--run_test={p}"))
        .collect()
}

/// One node of the listed test tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestNode {
    pub name: String,
    /// `(file, line)` as printed by the binary, file possibly relative.
    pub location: Option<(String, u32)>,
    pub enabled: bool,
    pub children: Vec<TestNode>,
}

impl TestNode {
    pub fn is_suite(&self) -> bool {
        !self.children.is_empty()
    }
}

struct DotUnit {
    name: String,
    location: Option<(String, u32)>,
    enabled: bool,
}

/// Parses `--list_content=DOT` output and returns the master suite.
pub fn parse_list_output(text: &str) -> Result<TestNode, ParseError> {
    let mut order: Vec<String> = Vec::new();
    let mut units: HashMap<String, DotUnit> = HashMap::new();
    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    let mut has_parent: HashMap<String, String> = HashMap::new();

    for line in text.lines() {
        for caps in NODE_RE.captures_iter(line) {
            let unit = caps[1].to_string();
            let attrs = &caps[2];
            let label = LABEL_RE
                .captures(attrs)
                .map(|c| c[1].replace("\\\"", "\""))
                .unwrap_or_else(|| unit.clone());
            let enabled = COLOR_RE
                .captures(attrs)
                .is_none_or(|c| &c[1] == "green");
            let (name, location) = split_label(&label);
            if !units.contains_key(&unit) {
                order.push(unit.clone());
            }
            units.insert(
                unit,
                DotUnit {
                    name,
                    location,
                    enabled,
                },
            );
        }
        for caps in EDGE_RE.captures_iter(line) {
            let (parent, child) = (caps[1].to_string(), caps[2].to_string());
            if let Some(previous) = has_parent.insert(child.clone(), parent.clone())
                && previous != parent
            {
                return Err(ParseError::MultipleParents(child));
            }
            children.entry(parent).or_default().push(child);
        }
    }

    for (child, parent) in &has_parent {
        for unit in [child, parent] {
            if !units.contains_key(unit) {
                return Err(ParseError::UnknownUnit(unit.clone()));
            }
        }
    }

    let root = order
        .iter()
        .find(|u| !has_parent.contains_key(*u))
        .ok_or(ParseError::EmptyTree)?;
    Ok(build_node(root, &mut units, &children))
}

fn build_node(
    unit: &str,
    units: &mut HashMap<String, DotUnit>,
    children: &HashMap<String, Vec<String>>,
) -> TestNode {
    let data = units.remove(unit).unwrap_or(DotUnit {
        name: unit.to_string(),
        location: None,
        enabled: true,
    });
    let kids = children
        .get(unit)
        .map(|list| {
            list.iter()
                .filter(|c| units.contains_key(*c))
                .cloned()
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
        .iter()
        .map(|c| build_node(c, units, children))
        .collect();
    TestNode {
        name: data.name,
        location: data.location,
        enabled: data.enabled,
        children: kids,
    }
}

/// Splits `name|file(line)|...` into the name and the location.
fn split_label(label: &str) -> (String, Option<(String, u32)>) {
    let mut parts = label.split('|');
    let name = parts.next().unwrap_or_default().trim().to_string();
    let location = parts.next().and_then(|loc| {
        let caps = LOCATION_RE.captures(loc.trim())?;
        let line = caps[2].parse().ok()?;
        Some((caps[1].to_string(), line))
    });
    (name, location)
}

/// What the run log says about one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    CaseStarted {
        path: String,
    },
    CaseFinished {
        path: String,
        errors: Vec<TestMessage>,
        duration: Option<Duration>,
    },
    CaseSkipped {
        path: String,
        reason: String,
    },
    SuiteSkipped {
        path: String,
        reason: String,
    },
    /// An error reported for a unit that is not the running case, e.g. a
    /// suite fixture failing.
    UnitError {
        path: String,
        message: TestMessage,
    },
    /// The log ended while a case was still running (crash, kill).
    CaseAborted {
        path: String,
        errors: Vec<TestMessage>,
    },
}

struct RunningCase {
    path: String,
    errors: Vec<TestMessage>,
}

/// Incremental parser for the HRF run log. Feed it line by line.
#[derive(Default)]
pub struct RunLogParser {
    suites: Vec<String>,
    module_seen: bool,
    current: Option<RunningCase>,
}

impl RunLogParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn path_of(&self, name: &str) -> String {
        if self.suites.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.suites.join("/"), name)
        }
    }

    pub fn feed(&mut self, line: &str) -> Option<RunEvent> {
        let line = line.trim_end();

        if let Some(caps) = ENTER_RE.captures(line) {
            let name = caps["name"].to_string();
            return match &caps["unit"] {
                "module" => {
                    self.module_seen = true;
                    None
                }
                "suite" => {
                    self.suites.push(name);
                    None
                }
                _ => {
                    let path = self.path_of(&name);
                    self.current = Some(RunningCase {
                        path: path.clone(),
                        errors: Vec::new(),
                    });
                    Some(RunEvent::CaseStarted { path })
                }
            };
        }

        if let Some(caps) = LEAVE_RE.captures(line) {
            return match &caps["unit"] {
                "suite" => {
                    self.suites.pop();
                    None
                }
                "case" => {
                    let duration = caps
                        .name("time")
                        .and_then(|t| t.as_str().parse::<u64>().ok())
                        .map(|value| to_duration(value, caps.name("tu").map_or("us", |u| u.as_str())));
                    let path = self.path_of(&caps["name"]);
                    let errors = match self.current.take() {
                        Some(running) if running.path == path => running.errors,
                        Some(running) => {
                            self.current = Some(running);
                            Vec::new()
                        }
                        None => Vec::new(),
                    };
                    Some(RunEvent::CaseFinished {
                        path,
                        errors,
                        duration,
                    })
                }
                _ => None,
            };
        }

        if let Some(caps) = ERROR_RE.captures(line) {
            let location = location_of(&caps);
            let message = TestMessage::at(caps["msg"].to_string(), location);
            let path = caps["path"].to_string();
            return match &mut self.current {
                Some(running) if running.path == path => {
                    running.errors.push(message);
                    None
                }
                _ => Some(RunEvent::UnitError { path, message }),
            };
        }

        if let Some(caps) = SKIP_RE.captures(line) {
            let path = caps["path"].to_string();
            let reason = caps["why"].to_string();
            return Some(match &caps["unit"] {
                "suite" => RunEvent::SuiteSkipped { path, reason },
                _ => RunEvent::CaseSkipped { path, reason },
            });
        }

        None
    }

    /// Closes the log. Reports a case that never finished.
    pub fn finish(&mut self) -> Option<RunEvent> {
        self.current.take().map(|running| RunEvent::CaseAborted {
            path: running.path,
            errors: running.errors,
        })
    }

    /// Whether any line looked like Boost.Test log output.
    pub fn saw_log(&self) -> bool {
        self.module_seen
    }
}

/// Parses a whole run log at once.
pub fn parse_run_log(text: &str) -> Vec<RunEvent> {
    let mut parser = RunLogParser::new();
    let mut events: Vec<RunEvent> = text.lines().filter_map(|l| parser.feed(l)).collect();
    events.extend(parser.finish());
    events
}

fn to_duration(value: u64, unit: &str) -> Duration {
    match unit {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        _ => Duration::from_micros(value),
    }
}

fn location_of(caps: &regex::Captures<'_>) -> Option<SourceLocation> {
    let file = caps.name("file")?.as_str();
    let line: u32 = caps.name("line")?.as_str().parse().ok()?;
    if file == "unknown location" {
        return None;
    }
    Some(SourceLocation {
        file: PathBuf::from(file),
        line,
    })
}

//! Best-effort reading of Docker Compose files.
//!
//! This is line and indentation scanning, not YAML parsing. It is good enough
//! to list services and guess which one runs Django; the guess can be wrong,
//! which is why the executor retries against the other candidates.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

const COMPOSE_FILES: [&str; 4] = [
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yaml",
    "compose.yml",
];

/// A declared service and the raw lines nested under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeService {
    pub name: String,
    pub body: Vec<String>,
}

pub fn find_compose_file(root: &Path) -> Option<PathBuf> {
    COMPOSE_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|p| p.is_file())
}

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

pub fn parse_services(content: &str) -> Vec<ComposeService> {
    let mut services: Vec<ComposeService> = Vec::new();
    let mut services_indent: Option<usize> = None;
    let mut child_indent: Option<usize> = None;

    for raw in content.lines() {
        let line = strip_comment(raw);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let indent = leading_spaces(line);

        let Some(base) = services_indent else {
            if trimmed == "services:" {
                services_indent = Some(indent);
            }
            continue;
        };

        if indent <= base {
            break;
        }

        // Service keys sit one level below `services:`, whatever width that level is.
        let level = *child_indent.get_or_insert(indent);
        if indent == level {
            if let Some(name) = trimmed.strip_suffix(':') {
                let name = name.trim().trim_matches(|c| c == '"' || c == '\'');
                if !name.is_empty() {
                    services.push(ComposeService {
                        name: name.to_string(),
                        body: Vec::new(),
                    });
                }
            }
            continue;
        }

        if indent > level {
            if let Some(current) = services.last_mut() {
                current.body.push(trimmed.to_string());
            }
        }
    }

    services
}

/// Heuristic likelihood that `service` runs the Django application.
pub fn score_service(service: &ComposeService) -> i32 {
    let name = service.name.trim().to_lowercase();
    let body = service.body.join("\n").to_lowercase();
    let mut score = 0;

    if matches!(
        name.as_str(),
        "web" | "django" | "app" | "backend" | "django-app"
    ) {
        score += 250;
    }
    for (needle, points) in [
        ("django", 120),
        ("web", 80),
        ("app", 60),
        ("api", 40),
        ("admin", 30),
    ] {
        if name.contains(needle) {
            score += points;
        }
    }
    if ["worker", "celery", "rq"].iter().any(|n| name.contains(n)) {
        score -= 180;
    }
    if [
        "redis", "postgres", "mysql", "db", "proxy", "webpack", "nginx", "rabbit",
    ]
    .iter()
    .any(|n| name.contains(n))
    {
        score -= 260;
    }

    if body.contains("manage.py runserver") {
        score += 260;
    }
    if body.contains("python manage.py") || body.contains("./manage.py") {
        score += 170;
    }
    if ["gunicorn", "uvicorn", "daphne"]
        .iter()
        .any(|n| body.contains(n))
    {
        score += 110;
    }
    if body.contains("django_settings_module") {
        score += 50;
    }
    if body.contains("rqworker") || body.contains("celery worker") {
        score -= 180;
    }
    if body.contains("redis-server") || body.contains("postgres:") {
        score -= 120;
    }

    score
}

/// Service names ordered most-likely-Django first; ties broken by name.
pub fn rank_services(services: &[ComposeService]) -> Vec<String> {
    let mut ranked: Vec<(i32, &str)> = services
        .iter()
        .map(|s| (score_service(s), s.name.trim()))
        .filter(|(_, name)| !name.is_empty())
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    let mut seen = HashSet::new();
    ranked
        .into_iter()
        .filter(|(_, name)| seen.insert(*name))
        .map(|(_, name)| name.to_string())
        .collect()
}

/// Ranked candidates from a compose file; empty if it is missing or unreadable.
pub fn django_service_candidates(compose_file: &Path) -> Vec<String> {
    match fs::read_to_string(compose_file) {
        Ok(content) => rank_services(&parse_services(&content)),
        Err(_) => Vec::new(),
    }
}

pub fn find_django_service(compose_file: &Path, default_service: &str) -> String {
    django_service_candidates(compose_file)
        .into_iter()
        .next()
        .unwrap_or_else(|| default_service.to_string())
}

/// Environment variables declared in a compose file: `- KEY=value` entries of
/// `environment:` lists plus the contents of referenced `.env` files.
pub fn extract_environment(compose_file: &Path) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    let Ok(content) = fs::read_to_string(compose_file) else {
        return env;
    };
    let dir = compose_file.parent().unwrap_or_else(|| Path::new("."));

    let mut in_environment = false;
    for line in content.lines() {
        let trimmed = strip_comment(line).trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("- ") {
            let item = item.trim().trim_matches(|c| c == '"' || c == '\'');
            if item.ends_with(".env") || item.contains(".env") && !item.contains('=') {
                if let Ok(env_content) = fs::read_to_string(dir.join(item)) {
                    parse_env_lines(&env_content, &mut env);
                }
                continue;
            }
            if in_environment {
                if let Some((key, value)) = split_assignment(item) {
                    env.insert(key, value);
                }
            }
            continue;
        }

        if trimmed.starts_with("environment:") {
            in_environment = true;
            continue;
        }
        if trimmed.ends_with(':') && !trimmed.contains('=') {
            in_environment = false;
        }
    }

    env
}

fn parse_env_lines(content: &str, env: &mut BTreeMap<String, String>) {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = split_assignment(line) {
            env.insert(key, value);
        }
    }
}

fn split_assignment(item: &str) -> Option<(String, String)> {
    let (key, value) = item.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
    Some((key.to_string(), value.to_string()))
}

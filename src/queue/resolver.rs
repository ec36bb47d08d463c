// ABOUTME: Queue name templates: token substitution, sanitization, and priority expansion
// ABOUTME: Maps a task's logical invoke template onto a physical queue or the direct path

use indexmap::IndexSet;
use regex::{Captures, Regex};
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::error::{QueueError, Result};
use crate::engine::params::{Priority, TaskParameters};
use crate::parser::pipeline::pipeline_id;

/// Pseudo-queue resolving to the configured default physical queue.
pub const DEFAULT_QUEUE: &str = "DEFAULT";
/// Pseudo-queue meaning "run synchronously in this process".
pub const DIRECT_QUEUE: &str = "DIRECT";

pub const KNOWN_TOKENS: [&str; 7] = [
    "app_id",
    "scope",
    "pipeline_id",
    "pipeline_key",
    "business_unit",
    "solution_code",
    "priority",
];

const MAX_QUEUE_NAME_LEN: usize = 100;

pub fn is_pseudo_queue(template: &str) -> bool {
    template == DEFAULT_QUEUE || template == DIRECT_QUEUE
}

fn token_regex() -> &'static Regex {
    static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();
    TOKEN_REGEX.get_or_init(|| {
        Regex::new(r"\{([^{}]*)\}")
            .unwrap_or_else(|e| panic!("Failed to compile token pattern: {e}"))
    })
}

/// Names inside `{...}` in order of appearance.
///
/// Fails with a reason when a brace is left unmatched or a token is empty
/// or contains whitespace.
pub fn template_tokens(template: &str) -> std::result::Result<Vec<String>, String> {
    let regex = token_regex();
    let mut tokens = Vec::new();

    for captures in regex.captures_iter(template) {
        let token = &captures[1];
        if token.is_empty() {
            return Err("empty token '{}'".to_string());
        }
        if token.chars().any(char::is_whitespace) {
            return Err(format!("token '{{{}}}' contains whitespace", token));
        }
        tokens.push(token.to_string());
    }

    let remainder = regex.replace_all(template, "");
    if remainder.contains('{') || remainder.contains('}') {
        return Err("unbalanced braces".to_string());
    }

    Ok(tokens)
}

/// Values available to queue templates. `None` means the token cannot be rendered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenValues {
    pub app_id: Option<String>,
    pub scope: Option<String>,
    pub pipeline_key: Option<String>,
    pub business_unit: Option<String>,
    pub solution_code: Option<String>,
    pub priority: Option<Priority>,
}

impl TokenValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_params(
        params: &TaskParameters,
        business_unit: Option<&str>,
        solution_code: Option<&str>,
    ) -> Self {
        Self {
            app_id: Some(params.identity.app_id.clone()),
            scope: Some(params.pipeline_scope.clone()),
            pipeline_key: Some(params.pipeline_key.clone()),
            business_unit: business_unit.map(str::to_string),
            solution_code: solution_code.map(str::to_string),
            priority: Some(params.priority),
        }
    }

    pub fn with_app_id(mut self, app_id: &str) -> Self {
        self.app_id = Some(app_id.to_string());
        self
    }

    pub fn with_pipeline(mut self, scope: &str, key: &str) -> Self {
        self.scope = Some(scope.to_string());
        self.pipeline_key = Some(key.to_string());
        self
    }

    pub fn with_business_unit(mut self, business_unit: Option<&str>) -> Self {
        self.business_unit = business_unit.map(str::to_string);
        self
    }

    pub fn with_solution_code(mut self, solution_code: Option<&str>) -> Self {
        self.solution_code = solution_code.map(str::to_string);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    fn value(&self, token: &str) -> Option<String> {
        match token {
            "app_id" => self.app_id.clone(),
            "scope" => self.scope.clone(),
            "pipeline_key" => self.pipeline_key.clone(),
            "pipeline_id" => match (&self.scope, &self.pipeline_key) {
                (Some(scope), Some(key)) => Some(pipeline_id(scope, key)),
                _ => None,
            },
            "business_unit" => self.business_unit.clone(),
            "solution_code" => self.solution_code.clone(),
            "priority" => self.priority.map(|p| p.as_str().to_string()),
            _ => None,
        }
    }
}

/// Substitute every token and sanitize the result into a physical queue name.
pub fn render_template(template: &str, values: &TokenValues) -> Result<String> {
    let template_error = |reason: String| QueueError::Template {
        template: template.to_string(),
        reason,
    };

    for token in template_tokens(template).map_err(template_error)? {
        if !KNOWN_TOKENS.contains(&token.as_str()) {
            return Err(template_error(format!("unknown token '{{{}}}'", token)));
        }
        if values.value(&token).is_none() {
            return Err(template_error(format!("no value for token '{{{}}}'", token)));
        }
    }

    let rendered = token_regex().replace_all(template, |captures: &Captures| {
        values.value(&captures[1]).unwrap_or_default()
    });

    let name = sanitize_queue_name(&rendered);
    if name.is_empty() {
        return Err(template_error("renders to an empty queue name".to_string()));
    }
    Ok(name)
}

/// Lowercase, map anything outside `[a-z0-9-]` to `-`, collapse runs of
/// hyphens, trim edge hyphens, and cap the length.
pub fn sanitize_queue_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    let mut last_hyphen = false;

    for c in raw.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' {
            if last_hyphen {
                continue;
            }
            last_hyphen = true;
        } else {
            last_hyphen = false;
        }
        name.push(c);
    }

    let mut name: String = name.trim_matches('-').chars().take(MAX_QUEUE_NAME_LEN).collect();
    while name.ends_with('-') {
        name.pop();
    }
    name
}

/// Every physical queue a set of templates can produce.
///
/// Templates containing `{priority}` expand once per priority. Pseudo-queues
/// never appear in the output, templates that cannot be rendered are logged
/// and skipped, and duplicates are removed keeping first occurrence.
pub fn expand_queue_templates(templates: &[String], values: &TokenValues) -> Vec<String> {
    let mut names = IndexSet::new();

    for template in templates {
        if is_pseudo_queue(template) {
            continue;
        }

        let uses_priority = template_tokens(template)
            .map(|tokens| tokens.iter().any(|t| t == "priority"))
            .unwrap_or(false);
        let expansions: Vec<TokenValues> = if uses_priority {
            Priority::ALL
                .iter()
                .map(|p| values.clone().with_priority(*p))
                .collect()
        } else {
            vec![values.clone()]
        };

        for expansion in expansions {
            match render_template(template, &expansion) {
                Ok(name) => {
                    names.insert(name);
                }
                Err(e) => warn!("Skipping queue template: {}", e),
            }
        }
    }

    names.into_iter().collect()
}

/// Where a task goes after template resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueTarget {
    Direct,
    Queue(String),
}

#[derive(Debug, Clone)]
pub struct QueueNameResolver {
    default_queue: String,
    business_unit: Option<String>,
    solution_code: Option<String>,
}

impl QueueNameResolver {
    pub fn new(default_queue: &str) -> Self {
        Self {
            default_queue: default_queue.to_string(),
            business_unit: None,
            solution_code: None,
        }
    }

    pub fn with_business_unit(mut self, business_unit: Option<String>) -> Self {
        self.business_unit = business_unit;
        self
    }

    pub fn with_solution_code(mut self, solution_code: Option<String>) -> Self {
        self.solution_code = solution_code;
        self
    }

    pub fn default_queue(&self) -> &str {
        &self.default_queue
    }

    /// Token values for publish-time expansion, without a document
    pub fn token_values(&self, app_id: &str, scope: &str, key: &str) -> TokenValues {
        TokenValues::new()
            .with_app_id(app_id)
            .with_pipeline(scope, key)
            .with_business_unit(self.business_unit.as_deref())
            .with_solution_code(self.solution_code.as_deref())
    }

    /// Resolve the task's `invoke` template; a missing template means `DEFAULT`.
    pub fn resolve(&self, params: &TaskParameters) -> Result<QueueTarget> {
        let template = params
            .task_config
            .invoke
            .as_deref()
            .unwrap_or(DEFAULT_QUEUE);

        let target = match template {
            DIRECT_QUEUE => QueueTarget::Direct,
            DEFAULT_QUEUE => QueueTarget::Queue(self.default_queue.clone()),
            template => {
                let values = TokenValues::for_params(
                    params,
                    self.business_unit.as_deref(),
                    self.solution_code.as_deref(),
                );
                QueueTarget::Queue(render_template(template, &values)?)
            }
        };

        debug!(
            "Resolved queue template '{}' for task '{}' to {:?}",
            template,
            params.task_id(),
            target
        );
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::params::{DocumentIdentity, PipelineParameters};
    use crate::parser::TaskConfig;

    fn params(invoke: Option<&str>) -> TaskParameters {
        let mut task = TaskConfig::module("ocr", "ocr");
        task.invoke = invoke.map(str::to_string);
        PipelineParameters::new(DocumentIdentity::new("a1", "t1", "p1", "d1"), "clinical", "intake")
            .with_priority(Priority::Quarantine)
            .bind(task)
    }

    #[test]
    fn test_priority_template_expands_to_three_names() {
        let names = expand_queue_templates(
            &["q-{priority}-{app_id}".to_string()],
            &TokenValues::new().with_app_id("a1"),
        );

        assert_eq!(names, vec!["q-high-a1", "q-default-a1", "q-quarantine-a1"]);
    }

    #[test]
    fn test_pseudo_queues_never_expand() {
        let names = expand_queue_templates(
            &[
                "DEFAULT".to_string(),
                "DIRECT".to_string(),
                "ocr-{app_id}".to_string(),
            ],
            &TokenValues::new().with_app_id("a1"),
        );

        assert_eq!(names, vec!["ocr-a1"]);
    }

    #[test]
    fn test_expansion_deduplicates() {
        let names = expand_queue_templates(
            &[
                "ocr-{app_id}".to_string(),
                "OCR-{app_id}".to_string(),
                "ocr-{priority}".to_string(),
                "ocr-high".to_string(),
            ],
            &TokenValues::new().with_app_id("a1"),
        );

        assert_eq!(
            names,
            vec!["ocr-a1", "ocr-high", "ocr-default", "ocr-quarantine"]
        );
    }

    #[test]
    fn test_unrenderable_templates_are_skipped() {
        let names = expand_queue_templates(
            &[
                "ocr-{region}".to_string(),
                "ocr-{business_unit}".to_string(),
                "ocr-{scope}".to_string(),
            ],
            &TokenValues::new().with_pipeline("clinical", "intake"),
        );

        assert_eq!(names, vec!["ocr-clinical"]);
    }

    #[test]
    fn test_malformed_templates_are_rejected() {
        let values = TokenValues::new().with_app_id("a1");

        for template in ["q-{ app_id }", "q-}{app_id", "q-{app_id", "q-{}", "q-{{app_id}}"] {
            let err = render_template(template, &values).unwrap_err();
            assert!(
                matches!(err, QueueError::Template { .. }),
                "{} should not render",
                template
            );
        }
    }

    #[test]
    fn test_spaced_priority_token_is_not_expanded_silently() {
        let names = expand_queue_templates(
            &["q-{ priority }".to_string()],
            &TokenValues::new().with_app_id("a1"),
        );

        assert!(names.is_empty());
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let values = TokenValues::new()
            .with_app_id("{scope}")
            .with_pipeline("clinical", "intake");

        assert_eq!(
            render_template("{app_id}-{pipeline_key}", &values).unwrap(),
            "scope-intake"
        );
    }

    #[test]
    fn test_template_tokens_in_order() {
        assert_eq!(
            template_tokens("{scope}-{priority}-x").unwrap(),
            vec!["scope", "priority"]
        );
        assert_eq!(
            template_tokens("q-}{app_id").unwrap_err(),
            "unbalanced braces"
        );
    }

    #[test]
    fn test_sanitize_queue_name() {
        assert_eq!(sanitize_queue_name("OCR_Queue--High"), "ocr-queue-high");
        assert_eq!(sanitize_queue_name("--a.b c--"), "a-b-c");
        assert_eq!(sanitize_queue_name(&"x".repeat(150)).len(), 100);
    }

    #[test]
    fn test_pipeline_id_token() {
        let values = TokenValues::new().with_pipeline("clinical", "intake");
        assert_eq!(
            render_template("{pipeline_id}-work", &values).unwrap(),
            "clinical-intake-work"
        );
    }

    #[test]
    fn test_resolve_pseudo_and_physical() {
        let resolver = QueueNameResolver::new("docpipe-default")
            .with_business_unit(Some("Health".to_string()));

        assert_eq!(
            resolver.resolve(&params(None)).unwrap(),
            QueueTarget::Queue("docpipe-default".to_string())
        );
        assert_eq!(
            resolver.resolve(&params(Some("DIRECT"))).unwrap(),
            QueueTarget::Direct
        );
        assert_eq!(
            resolver
                .resolve(&params(Some("{business_unit}-{pipeline_key}-{priority}")))
                .unwrap(),
            QueueTarget::Queue("health-intake-quarantine".to_string())
        );
    }

    #[test]
    fn test_resolve_missing_token_value_is_an_error() {
        let resolver = QueueNameResolver::new("docpipe-default");
        let err = resolver
            .resolve(&params(Some("{solution_code}-ocr")))
            .unwrap_err();

        assert!(matches!(err, QueueError::Template { .. }));
    }
}

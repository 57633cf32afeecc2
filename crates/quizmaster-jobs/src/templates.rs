//! Email template rendering with `{{variable}}` substitution.

use std::collections::HashMap;

use crate::error::JobError;

/// An email template: subject plus HTML body.
#[derive(Debug, Clone)]
pub struct EmailTemplate {
    pub id: String,
    pub subject: String,
    pub html: String,
}

/// Subject and body after substitution.
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Simple template renderer using `{{variable}}` syntax.
pub struct TemplateRenderer {
    templates: HashMap<String, EmailTemplate>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Renderer preloaded with the reminder and report templates.
    pub fn with_defaults() -> Self {
        let mut renderer = Self::new();
        renderer.register(EmailTemplate {
            id: "quiz-reminder".to_string(),
            subject: "You have {{count}} unviewed quizzes waiting".to_string(),
            html: "<html><body>\
                   <h2>Quiz Reminder</h2>\
                   <p>Hello {{name}},</p>\
                   <p>You have {{count}} unviewed quizzes waiting for you:</p>\
                   <ul>{{quiz_list}}</ul>\
                   <p>Login to view and attempt them. Good luck!</p>\
                   </body></html>"
                .to_string(),
        });
        renderer.register(EmailTemplate {
            id: "monthly-report".to_string(),
            subject: "Your activity report for {{month}}".to_string(),
            html: "<html><body>\
                   <h2>Monthly Report: {{month}}</h2>\
                   <p>Hello {{name}},</p>\
                   <p>You attempted {{attempts}} quizzes, scoring {{total_score}} \
                   out of {{total_possible}} ({{average_pct}}%).</p>\
                   <p>Best score: {{best_score}}. Rank: #{{rank}}. \
                   Time spent: {{time_spent_mins}} minutes.</p>\
                   <p>Your raw activity is attached as CSV.</p>\
                   </body></html>"
                .to_string(),
        });
        renderer
    }

    pub fn register(&mut self, template: EmailTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn render(
        &self,
        template_id: &str,
        data: &HashMap<String, serde_json::Value>,
    ) -> Result<RenderedEmail, JobError> {
        let template = self
            .templates
            .get(template_id)
            .ok_or_else(|| JobError::TemplateNotFound(template_id.to_string()))?;

        Ok(RenderedEmail {
            subject: render_string(&template.subject, data),
            html: render_string(&template.html, data),
        })
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn render_string(template: &str, data: &HashMap<String, serde_json::Value>) -> String {
    let mut result = template.to_string();

    for (key, value) in data {
        let placeholder = format!("{{{{{}}}}}", key);
        let replacement = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Null => String::new(),
            _ => value.to_string(),
        };
        result = result.replace(&placeholder, &replacement);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_subject_and_body() {
        let mut renderer = TemplateRenderer::new();
        renderer.register(EmailTemplate {
            id: "test".to_string(),
            subject: "Hello {{name}}".to_string(),
            html: "<p>{{count}} quizzes</p>".to_string(),
        });

        let mut data = HashMap::new();
        data.insert("name".to_string(), serde_json::json!("Ada"));
        data.insert("count".to_string(), serde_json::json!(3));

        let rendered = renderer.render("test", &data).unwrap();
        assert_eq!(rendered.subject, "Hello Ada");
        assert_eq!(rendered.html, "<p>3 quizzes</p>");
    }

    #[test]
    fn missing_template_is_an_error() {
        let renderer = TemplateRenderer::new();
        let result = renderer.render("nope", &HashMap::new());
        assert!(matches!(result, Err(JobError::TemplateNotFound(_))));
    }

    #[test]
    fn default_templates_are_registered() {
        let renderer = TemplateRenderer::with_defaults();
        assert!(renderer.render("quiz-reminder", &HashMap::new()).is_ok());
        assert!(renderer.render("monthly-report", &HashMap::new()).is_ok());
    }
}

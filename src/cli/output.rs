use secrecy::ExposeSecret;
use serde_json::{Value, json};

use crate::models::{OutputFormat, Settings};
use crate::services::{
    BootstrapReport, DatabaseOutcome, ExtensionOutcome, IngestReport, Prepared, StatusReport,
};

const REDACTED: &str = "***";

pub trait Formatter {
    fn format_settings(&self, settings: &Settings) -> String;
    fn format_bootstrap(&self, report: &BootstrapReport) -> String;
    fn format_ingest(&self, report: &IngestReport) -> String;
    fn format_prepared(&self, prepared: &Prepared) -> String;
    fn format_status(&self, status: &StatusReport) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_problems(&self, problems: &[String]) -> String;
}

/// Settings with every secret masked.
pub fn settings_view(settings: &Settings) -> Value {
    let mask = |present: bool| if present { REDACTED } else { "" };

    json!({
        "app_name": settings.app_name,
        "version": settings.version,
        "environment": settings.environment.to_string(),
        "debug": settings.debug,
        "model": {
            "chat_model_name": settings.model.chat_model_name,
            "embedding_model_name": settings.model.embedding_model_name,
            "api_key": mask(!settings.model.api_key.expose_secret().is_empty()),
            "base_url": settings.model.base_url,
            "timeout_secs": settings.model.timeout_secs,
            "batch_size": settings.model.batch_size,
        },
        "database": {
            "user": settings.database.user,
            "password": REDACTED,
            "host": settings.database.host,
            "port": settings.database.port,
            "name": settings.database.name,
            "vector_db_name": settings.database.vector_db_name,
            "collection_name": settings.database.collection_name,
            "connect_timeout_secs": settings.database.connect_timeout_secs,
            "vector_uri": settings
                .vector_connection()
                .redacted_uri()
                .map(|u| u.to_string())
                .unwrap_or_default(),
        },
        "tunnel": {
            "enabled": settings.tunnel.enabled,
            "host_name": settings.tunnel.host_name,
            "port": settings.tunnel.port,
            "username": settings.tunnel.username,
            "db_port": settings.tunnel.db_port,
            "local_bind_port": settings.tunnel.local_bind_port,
            "identity_file": settings.tunnel.identity_file,
            "connect_timeout_secs": settings.tunnel.connect_timeout_secs,
        },
        "auth": {
            "secret_key": mask(settings.auth.secret_key.is_some()),
        },
    })
}

pub struct TextFormatter;

impl TextFormatter {
    fn push_section(output: &mut String, name: &str, section: &Value) {
        output.push_str(&format!("[{name}]\n"));
        if let Value::Object(fields) = section {
            for (key, value) in fields {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => "-".to_string(),
                    other => other.to_string(),
                };
                output.push_str(&format!("  {key:<22} {rendered}\n"));
            }
        }
    }
}

impl Formatter for TextFormatter {
    fn format_settings(&self, settings: &Settings) -> String {
        let view = settings_view(settings);
        let mut output = format!(
            "{} {} ({})\n",
            settings.app_name, settings.version, settings.environment
        );
        output.push_str(&format!("  debug                  {}\n\n", settings.debug));
        for section in ["model", "database", "tunnel", "auth"] {
            Self::push_section(&mut output, section, &view[section]);
            output.push('\n');
        }
        output
    }

    fn format_bootstrap(&self, report: &BootstrapReport) -> String {
        let database = match report.database_outcome {
            DatabaseOutcome::Created => "created",
            DatabaseOutcome::AlreadyPresent => "already present",
        };
        let extension = match report.extension_outcome {
            ExtensionOutcome::Enabled => "enabled",
            ExtensionOutcome::AlreadyEnabled => "already enabled",
        };
        format!(
            "Database {}: {}\nExtension {}: {}\n",
            report.database, database, report.extension, extension
        )
    }

    fn format_ingest(&self, report: &IngestReport) -> String {
        let mut output = String::new();
        if let Some(bootstrap) = &report.bootstrap {
            output.push_str(&self.format_bootstrap(bootstrap));
        }
        output.push_str(&format!(
            "Ingested into '{}'\n  Documents: {}\n  Chunks:    {}\n  Stored:    {}\n  Duration:  {}ms\n",
            report.collection, report.documents, report.chunks, report.stored, report.duration_ms
        ));
        output
    }

    fn format_prepared(&self, prepared: &Prepared) -> String {
        let mut output = format!(
            "Dry run: {} documents, {} chunks\n",
            prepared.documents,
            prepared.chunks.len()
        );
        for chunk in &prepared.chunks {
            let page = chunk.page.map(|p| format!(" p{p}")).unwrap_or_default();
            output.push_str(&format!(
                "  {}{} #{} @{} ({} chars)\n",
                chunk.source,
                page,
                chunk.chunk_index,
                chunk.start_index,
                chunk.content.chars().count()
            ));
        }
        output
    }

    fn format_status(&self, status: &StatusReport) -> String {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        let mut output = format!("Environment: {}\n", status.environment);
        output.push_str(&format!(
            "Tunnel:      {}\n",
            if status.tunnel_enabled { "enabled" } else { "disabled" }
        ));
        output.push_str(&format!(
            "Database:    {} (exists: {})\n",
            status.database.database,
            yes_no(status.database.database_exists)
        ));
        output.push_str(&format!(
            "Extension:   {} (enabled: {})\n",
            status.database.extension,
            yes_no(status.database.extension_enabled)
        ));
        match &status.collection {
            Some(info) => output.push_str(&format!(
                "Collection:  {} ({} embeddings)\n",
                info.name, info.points_count
            )),
            None => output.push_str("Collection:  not created\n"),
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{message}\n")
    }

    fn format_problems(&self, problems: &[String]) -> String {
        let mut output = String::from("Production readiness check failed:\n");
        for problem in problems {
            output.push_str(&format!("  - {problem}\n"));
        }
        output
    }
}

pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render(&self, value: &Value) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        let mut rendered =
            rendered.unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string());
        rendered.push('\n');
        rendered
    }

    fn render_serializable<T: serde::Serialize>(&self, value: &T) -> String {
        match serde_json::to_value(value) {
            Ok(v) => self.render(&v),
            Err(e) => self.render(&json!({ "error": e.to_string() })),
        }
    }
}

impl Formatter for JsonFormatter {
    fn format_settings(&self, settings: &Settings) -> String {
        self.render(&settings_view(settings))
    }

    fn format_bootstrap(&self, report: &BootstrapReport) -> String {
        self.render_serializable(report)
    }

    fn format_ingest(&self, report: &IngestReport) -> String {
        self.render_serializable(report)
    }

    fn format_prepared(&self, prepared: &Prepared) -> String {
        self.render(&json!({
            "dry_run": true,
            "documents": prepared.documents,
            "chunks": prepared.chunks.iter().map(|c| json!({
                "id": c.id,
                "source": c.source,
                "page": c.page,
                "chunk_index": c.chunk_index,
                "start_index": c.start_index,
                "chars": c.content.chars().count(),
            })).collect::<Vec<_>>(),
        }))
    }

    fn format_status(&self, status: &StatusReport) -> String {
        self.render_serializable(status)
    }

    fn format_message(&self, message: &str) -> String {
        self.render(&json!({ "message": message }))
    }

    fn format_problems(&self, problems: &[String]) -> String {
        self.render(&json!({ "valid": false, "required": problems }))
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}

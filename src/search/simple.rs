// Token filter over the searchable fields of a dump
use crate::model::DumpViewModel;

/// All tokens must appear (case-insensitive) in at least one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleFilter {
    tokens: Vec<String>,
}

impl SimpleFilter {
    /// `None` for a missing or blank filter
    pub fn parse(filter: Option<&str>) -> Option<Self> {
        let tokens: Vec<String> = filter?
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        (!tokens.is_empty()).then_some(Self { tokens })
    }

    pub fn matches(&self, view: &DumpViewModel) -> bool {
        let fields = searchable_fields(view);
        self.tokens
            .iter()
            .all(|token| fields.iter().any(|field| field.contains(token.as_str())))
    }
}

fn searchable_fields(view: &DumpViewModel) -> Vec<String> {
    let dump = &view.dump;
    let mut fields = vec![
        dump.id.bundle_id.to_string(),
        dump.id.dump_id.clone(),
        dump.filename.clone(),
        view.bundle.filename.clone(),
        view.bundle.source_url.clone(),
        dump.status.to_string(),
    ];
    for (key, value) in &dump.custom_properties {
        fields.push(key.clone());
        fields.push(value.clone());
    }
    if let Some(summary) = &dump.summary {
        fields.extend(summary.last_event_type.iter().cloned());
        fields.extend(summary.last_event_description.iter().cloned());
    }
    fields.iter_mut().for_each(|f| *f = f.to_lowercase());
    fields
}

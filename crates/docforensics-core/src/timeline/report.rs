/// Timeline exports
use crate::timeline::{EventCategory, Timeline};

const RULE_HEAVY: &str = "═══════════════════════════════════════════════════════════";
const RULE_LIGHT: &str = "───────────────────────────────────────────────────────────";
const MAX_REPORTED_EVENTS: usize = 50;

fn csv_field(text: &str) -> String {
    text.replace([',', '\n', '\r'], ";")
}

impl Timeline {
    /// Export timeline as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Export timeline as CSV, one row per event
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("Timestamp,Event ID,Event Type,Category,Actor,Risk Score,Flags\n");
        for entry in &self.events {
            let flags: Vec<String> = entry.flags.iter().map(|f| f.to_string()).collect();
            csv.push_str(&format!(
                "{},{},{},{},{},{:.4},{}\n",
                entry.event.timestamp.to_rfc3339(),
                csv_field(&entry.event.event_id),
                csv_field(&entry.event.event_type),
                entry.category,
                csv_field(entry.event.actor.as_deref().unwrap_or("")),
                entry.risk_score,
                flags.join("|")
            ));
        }
        csv
    }

    /// Generate human-readable text report
    pub fn to_text_report(&self) -> String {
        let mut report = String::new();

        report.push_str(RULE_HEAVY);
        report.push('\n');
        report.push_str(&format!("           DOCUMENT TIMELINE: {}\n", self.document_id));
        report.push_str(RULE_HEAVY);
        report.push_str("\n\n");

        let assessment = &self.risk_assessment;
        report.push_str("🛡️  RISK ASSESSMENT\n");
        report.push_str(RULE_LIGHT);
        report.push('\n');
        report.push_str(&format!(
            "Risk level: {} ({:.2})\n",
            assessment.risk_level, assessment.risk_score
        ));
        report.push_str(&format!("Patterns: {}\n", assessment.pattern_count));
        report.push_str(&format!(
            "Requires investigation: {}\n",
            if assessment.requires_investigation { "yes" } else { "no" }
        ));
        report.push_str(&format!("Recommendation: {}\n", assessment.risk_level.recommendation()));

        let stats = &self.statistics;
        report.push_str("\n📊 STATISTICS\n");
        report.push_str(RULE_LIGHT);
        report.push('\n');
        report.push_str(&format!("Total events: {}\n", stats.total_events));
        report.push_str(&format!("Distinct actors: {}\n", stats.distinct_actors));
        if let (Some(first), Some(last)) = (stats.first_event, stats.last_event) {
            report.push_str(&format!(
                "Span: {} to {}\n",
                first.format("%Y-%m-%d %H:%M:%S"),
                last.format("%Y-%m-%d %H:%M:%S")
            ));
        }
        if let Some(peak) = stats.peak_hour {
            report.push_str(&format!("Peak hour: {}\n", peak.format("%Y-%m-%d %H:00")));
        }
        for (category, count) in &stats.events_by_category {
            report.push_str(&format!("  {} x {}\n", count, category));
        }

        if !self.anomalies.is_empty() {
            report.push_str("\n⚠️  SUSPICIOUS PATTERNS DETECTED\n");
            report.push_str(RULE_LIGHT);
            report.push('\n');
            for (i, anomaly) in self.anomalies.iter().enumerate() {
                report.push_str(&format!(
                    "\n{}. {} (+{:.2} risk)\n",
                    i + 1,
                    anomaly.kind,
                    anomaly.contribution
                ));
                report.push_str(&format!("   {}\n", anomaly.description));
                report.push_str(&format!("   Events: {}\n", anomaly.event_ids.join(", ")));
            }
        }

        report.push_str("\n📅 EVENT TIMELINE\n");
        report.push_str(RULE_LIGHT);
        report.push('\n');
        for entry in self.events.iter().take(MAX_REPORTED_EVENTS) {
            let icon = match entry.category {
                EventCategory::Creation => "📝",
                EventCategory::Modification => "✏️ ",
                EventCategory::Access => "👁️ ",
                EventCategory::Blockchain => "🔗",
                EventCategory::Attestation => "✅",
                EventCategory::Security => "🔒",
            };
            let marker = if entry.flags.is_empty() { "" } else { " ⚠️" };
            report.push_str(&format!(
                "{} {} {} [{}]{}\n",
                entry.event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                icon,
                entry.event.event_type,
                entry.event.actor.as_deref().unwrap_or("-"),
                marker
            ));
        }

        if self.events.len() > MAX_REPORTED_EVENTS {
            report.push_str(&format!(
                "\n... and {} more events\n",
                self.events.len() - MAX_REPORTED_EVENTS
            ));
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use crate::config::TimelineConfig;
    use crate::timeline::tests::at;
    use crate::timeline::{ForensicEvent, TimelineBuilder};

    fn sample() -> crate::timeline::Timeline {
        let events = vec![
            ForensicEvent::new("e1", at(9, 0, 0), "document_created").with_actor("alice, jr"),
            ForensicEvent::new("e2", at(8, 0, 0), "document_viewed").with_actor("bob"),
        ];
        TimelineBuilder::new(TimelineConfig::default())
            .build("loan-42", &events)
            .unwrap()
    }

    #[test]
    fn test_empty_csv_has_header() {
        let timeline = TimelineBuilder::new(TimelineConfig::default())
            .build("loan-42", &[])
            .unwrap();
        assert_eq!(
            timeline.to_csv(),
            "Timestamp,Event ID,Event Type,Category,Actor,Risk Score,Flags\n"
        );
    }

    #[test]
    fn test_csv_rows_escape_commas_and_list_flags() {
        let csv = sample().to_csv();
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].contains("alice; jr"));
        assert!(rows[2].ends_with("out_of_order"));
    }

    #[test]
    fn test_text_report_sections() {
        let report = sample().to_text_report();
        assert!(report.contains("DOCUMENT TIMELINE: loan-42"));
        assert!(report.contains("SUSPICIOUS PATTERNS DETECTED"));
        assert!(report.contains("Total events: 2"));
        assert!(report.contains("Risk level: LOW"));
    }

    #[test]
    fn test_json_export_parses() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["document_id"], "loan-42");
        assert_eq!(value["risk_assessment"]["risk_level"], "low");
    }
}

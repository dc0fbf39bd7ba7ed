// Structured result of a web surfing task

use serde::{Deserialize, Serialize};

/// Answer produced by the summarizer after a browsing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSurferAnswer {
    pub task: String,
    pub is_successful: bool,
    pub short_answer: String,
    pub long_answer: String,
    #[serde(default)]
    pub visited_links: Vec<String>,
}

impl WebSurferAnswer {
    /// Parse the summarizer's reply.
    ///
    /// Models often wrap JSON in code fences or add a sentence around it, so
    /// the outermost `{ .. }` block is extracted before decoding.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let trimmed = raw.trim();
        let json = match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if start < end => &trimmed[start..=end],
            _ => trimmed,
        };
        serde_json::from_str(json)
    }

    /// Text handed back to the calling agent
    pub fn to_report(&self) -> String {
        let mut report = if self.is_successful {
            format!(
                "We have successfully completed the task:\n\n{}\n\nShort answer: {}\n\nDetailed answer: {}",
                self.task, self.short_answer, self.long_answer
            )
        } else {
            format!(
                "We have failed to complete the task:\n\n{}\n\nWhat we found: {}\n\nDetails: {}",
                self.task, self.short_answer, self.long_answer
            )
        };

        if !self.visited_links.is_empty() {
            report.push_str("\n\nVisited links:");
            for link in &self.visited_links {
                report.push_str("\n- ");
                report.push_str(link);
            }
        }
        report
    }

    /// Example shown to the summarizer as the required output shape
    pub fn example() -> Self {
        Self {
            task: "What is the most popular QLED TV to buy on amazon.com?".to_string(),
            is_successful: true,
            short_answer: "Amazon Fire TV 55\" Omni QLED Series 4K UHD smart TV".to_string(),
            long_answer: "Amazon has the best selling page by different categories and there is a category for QLED TVs under electronics. The most popular QLED TV is Amazon Fire TV 55\" Omni QLED Series 4K UHD smart TV, Dolby Vision IQ, Fire TV Ambient Experience, local dimming, hands-free with Alexa. It is the best selling QLED TV on Amazon.".to_string(),
            visited_links: vec![
                "https://www.amazon.com/Best-Sellers/zgbs".to_string(),
                "https://www.amazon.com/Best-Sellers-Electronics/zgbs/electronics".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_json() {
        let raw = "Here is the answer:\n```json\n{\"task\": \"t\", \"is_successful\": true, \"short_answer\": \"1242\", \"long_answer\": \"Founded 1242\"}\n```";

        let answer = WebSurferAnswer::parse(raw).unwrap();

        assert!(answer.is_successful);
        assert_eq!(answer.short_answer, "1242");
        assert!(answer.visited_links.is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        assert!(WebSurferAnswer::parse(r#"{"task": "t"}"#).is_err());
        assert!(WebSurferAnswer::parse("no json at all").is_err());
    }

    #[test]
    fn test_report_sentinels() {
        let mut answer = WebSurferAnswer::example();
        assert!(answer
            .to_report()
            .starts_with("We have successfully completed the task:"));

        answer.is_successful = false;
        let report = answer.to_report();
        assert!(report.starts_with("We have failed to complete the task:"));
        assert!(report.contains("https://www.amazon.com/Best-Sellers/zgbs"));
    }
}

//! The dashboard page, rendered once at startup from a single template.

const TEMPLATE: &str = include_str!("../templates/index.html");

#[derive(Debug, Clone)]
pub struct Dashboard {
    html: String,
}

impl Dashboard {
    /// Fill in the template. `default_stuno` is loaded automatically when the page opens.
    pub fn render(show_ranks: bool, default_stuno: Option<&str>) -> Self {
        let default_stuno = serde_json::to_string(&default_stuno)
            .unwrap_or_else(|_| "null".to_string())
            // keep the value from closing the surrounding <script>
            .replace('<', "\\u003c");
        let html = TEMPLATE
            .replace("__SHOW_RANKS__", if show_ranks { "true" } else { "false" })
            .replace("__DEFAULT_STUNO__", &default_stuno);
        Self { html }
    }

    pub fn html(&self) -> &str {
        &self.html
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_without_default() {
        let page = Dashboard::render(true, None);
        assert!(page.html().contains("const SHOW_RANKS = true;"));
        assert!(page.html().contains("const DEFAULT_STUNO = null;"));
        assert!(!page.html().contains("__SHOW_RANKS__"));
        assert!(!page.html().contains("__DEFAULT_STUNO__"));
    }

    #[test]
    fn test_render_with_default_and_hidden_ranks() {
        let page = Dashboard::render(false, Some("2024001"));
        assert!(page.html().contains("const SHOW_RANKS = false;"));
        assert!(page.html().contains("const DEFAULT_STUNO = \"2024001\";"));
    }

    #[test]
    fn test_default_cannot_break_out_of_script() {
        let page = Dashboard::render(true, Some("</script><b>"));
        assert!(!page.html().contains("</script><b>"));
    }
}

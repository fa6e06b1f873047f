use which::which;

/// Binaries from `tools` that are not on PATH.
pub fn missing_tools<'a, I>(tools: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut missing = Vec::new();
    for tool in tools {
        match which(tool) {
            Ok(path) => tracing::debug!("Found {}: {:?}", tool, path),
            Err(_) => {
                if !missing.iter().any(|m| m == tool) {
                    missing.push(tool.to_string());
                }
            }
        }
    }
    missing
}

/// Startup check. Missing tools are reported, not fatal: their jobs end up
/// `tool-unavailable`.
pub fn report_missing<'a, I>(tools: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let missing = missing_tools(tools);
    if missing.is_empty() {
        tracing::info!("All required tools found");
    } else {
        tracing::warn!(
            "Missing tools: {}. Their jobs will be marked unavailable",
            missing.join(", ")
        );
    }
    missing
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tools_dedups() {
        let missing = missing_tools(["sh", "no-such-tool-ipsnipe", "no-such-tool-ipsnipe"]);
        assert_eq!(missing, vec!["no-such-tool-ipsnipe".to_string()]);
    }
}

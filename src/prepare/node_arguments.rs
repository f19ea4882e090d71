const UNPARSABLE: &str = "Could not parse `--node-arguments` value. Make sure all strings are closed and backslashes are used correctly.";

/// Arguments for launching worker processes
///
/// Persisted arguments come first and command-line tokens after them; Node
/// honors the last occurrence of a repeated flag, so the command line wins.
pub fn normalize_node_arguments(
    persisted: Option<&[String]>,
    from_cli: Option<&str>,
) -> Result<Vec<String>, String> {
    let mut arguments: Vec<String> = persisted.map(<[String]>::to_vec).unwrap_or_default();

    if let Some(raw) = from_cli {
        let tokens = shell_words::split(raw).map_err(|_| UNPARSABLE.to_string())?;
        arguments.extend(tokens);
    }

    Ok(arguments)
}

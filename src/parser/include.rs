//! `#include` header rewriting.
//!
//! A spec document starts with a header of blank lines and `#include`
//! directives; the first other line ends the header. Each include path is
//! normalized to a bare module name (strip directories, strip everything
//! from the first dot) and the directive is rewritten to the canonical
//! `#include <Name.types>` form.

use super::errors::{SpecParseError, SpecParseResult};

/// Rewrite the include header of `spec` to canonical form and collect the
/// directly included module names in header order.
pub fn rewrite_includes(spec: &str) -> SpecParseResult<(String, Vec<String>)> {
    let mut included = Vec::new();
    let mut header_lines: Vec<String> = Vec::new();
    let mut body_lines: Vec<&str> = Vec::new();
    let mut in_header = true;
    for line in spec.lines() {
        if !in_header {
            body_lines.push(line);
            continue;
        }
        if line.trim().is_empty() {
            header_lines.push(String::new());
        } else if let Some(rest) = line.strip_prefix("#include") {
            let module = parse_include_path(rest)?;
            header_lines.push(format!("#include <{module}.types>"));
            included.push(module);
        } else {
            in_header = false;
            body_lines.push(line);
        }
    }
    let mut out = String::new();
    for l in &header_lines {
        out.push_str(l);
        out.push('\n');
    }
    for l in &body_lines {
        out.push_str(l);
        out.push('\n');
    }
    Ok((out, included))
}

/// Extract the module name from the `<path>` part of an include directive.
pub fn parse_include_path(rest: &str) -> SpecParseResult<String> {
    let rest = rest.trim();
    if !(rest.starts_with('<') && rest.ends_with('>')) || rest.len() < 2 {
        return Err(SpecParseError::MalformedInclude(rest.to_string()));
    }
    let mut path = rest[1..rest.len() - 1].trim();
    if let Some(pos) = path.rfind('/') {
        path = &path[pos + 1..];
    }
    if let Some(pos) = path.find('.') {
        path = path[..pos].trim_end();
    }
    if path.is_empty() {
        return Err(SpecParseError::MalformedInclude(rest.to_string()));
    }
    Ok(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_normalizes_paths() {
        let spec = "#include <some/dir/DepMod.spec>\n\n#include <Other.types>\nmodule M {\n};\n";
        let (rewritten, included) = rewrite_includes(spec).unwrap();
        assert_eq!(included, vec!["DepMod".to_string(), "Other".to_string()]);
        assert!(rewritten.starts_with("#include <DepMod.types>\n"));
        assert!(rewritten.contains("#include <Other.types>\n"));
        assert!(rewritten.contains("module M {"));
    }

    #[test]
    fn test_header_ends_at_first_content_line() {
        let spec = "module M {\n};\n#include <Late.types>\n";
        let (rewritten, included) = rewrite_includes(spec).unwrap();
        assert!(included.is_empty());
        // the late directive stays in the body untouched
        assert!(rewritten.contains("#include <Late.types>"));
    }

    #[test]
    fn test_malformed_include() {
        let err = rewrite_includes("#include Dep.types\nmodule M {};\n").unwrap_err();
        assert!(matches!(err, SpecParseError::MalformedInclude(_)));
    }
}

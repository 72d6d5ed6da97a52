//! Language-specific import extraction and resolution.
//!
//! Extraction pulls textual import specifiers out of a source file;
//! resolution maps each specifier to candidate repo-relative paths and
//! picks the first one present in the index. External modules (package
//! registries, the standard libraries) deliberately resolve to nothing.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Extract import specifiers from `source` for the given language tag.
pub fn extract_imports(language: &str, source: &str) -> Vec<String> {
    let mut specs = Vec::new();
    for line in source.lines() {
        let line = line.trim();
        match language {
            "typescript" | "javascript" => extract_js(line, &mut specs),
            "python" => extract_python(line, &mut specs),
            "go" => extract_go(line, &mut specs),
            "java" => extract_java(line, &mut specs),
            "rust" => extract_rust(line, &mut specs),
            "c" | "cpp" => extract_c(line, &mut specs),
            "csharp" => extract_csharp(line, &mut specs),
            _ => {}
        }
    }
    specs.dedup();
    specs
}

fn quoted(line: &str) -> Option<&str> {
    for quote in ['\'', '"'] {
        if let Some(open) = line.find(quote) {
            if let Some(close) = line[open + 1..].find(quote) {
                return Some(&line[open + 1..open + 1 + close]);
            }
        }
    }
    None
}

fn extract_js(line: &str, out: &mut Vec<String>) {
    let is_import = line.starts_with("import ") || line.starts_with("import{");
    let is_reexport = line.starts_with("export ") && line.contains(" from ");
    let is_require = line.contains("require(");
    if is_import || is_reexport || is_require {
        if let Some(spec) = quoted(line) {
            out.push(spec.to_string());
        }
    }
}

fn extract_python(line: &str, out: &mut Vec<String>) {
    if let Some(rest) = line.strip_prefix("import ") {
        for module in rest.split(',') {
            let module = module.split_whitespace().next().unwrap_or_default();
            if !module.is_empty() {
                out.push(module.to_string());
            }
        }
    } else if let Some(rest) = line.strip_prefix("from ") {
        if let Some(module) = rest.split_whitespace().next() {
            out.push(module.to_string());
        }
    }
}

fn extract_go(line: &str, out: &mut Vec<String>) {
    // Single import or a line inside an import ( ... ) block
    if line.starts_with("import ") || line.starts_with('"') {
        if let Some(spec) = quoted(line) {
            out.push(spec.to_string());
        }
    }
}

fn extract_java(line: &str, out: &mut Vec<String>) {
    if let Some(rest) = line.strip_prefix("import ") {
        let rest = rest.strip_prefix("static ").unwrap_or(rest);
        let spec = rest.trim_end_matches(';').trim();
        if !spec.is_empty() && !spec.ends_with(".*") {
            out.push(spec.to_string());
        }
    }
}

fn extract_rust(line: &str, out: &mut Vec<String>) {
    if let Some(rest) = line.strip_prefix("use ") {
        let spec = rest
            .trim_end_matches(';')
            .split(" as ")
            .next()
            .unwrap_or_default()
            .trim();
        // Grouped imports keep their common prefix
        let spec = spec.split('{').next().unwrap_or_default().trim_end_matches("::");
        if !spec.is_empty() {
            out.push(spec.to_string());
        }
    } else if let Some(rest) = line.strip_prefix("mod ") {
        let name = rest.trim_end_matches(';').trim();
        if !name.is_empty() && !name.contains('{') {
            out.push(format!("mod {name}"));
        }
    }
}

fn extract_c(line: &str, out: &mut Vec<String>) {
    // Only quoted includes; angle brackets are system headers
    if line.starts_with("#include") {
        if let Some(open) = line.find('"') {
            if let Some(close) = line[open + 1..].find('"') {
                out.push(line[open + 1..open + 1 + close].to_string());
            }
        }
    }
}

fn extract_csharp(line: &str, out: &mut Vec<String>) {
    if let Some(rest) = line.strip_prefix("using ") {
        let spec = rest.trim_end_matches(';').trim();
        // Skip using-statements and aliases; keep plain namespace imports
        if !spec.is_empty() && !spec.contains('(') && !spec.contains('=') {
            out.push(spec.to_string());
        }
    }
}

/// Resolve one specifier to a repo-relative path present in `files`.
///
/// All candidate paths are produced by the language strategy; the first
/// that exists wins.
pub fn resolve_import(
    language: &str,
    from_file: &str,
    specifier: &str,
    files: &HashSet<String>,
) -> Option<String> {
    let candidates = match language {
        "typescript" | "javascript" => resolve_js(from_file, specifier),
        "python" => resolve_python(specifier, files),
        "go" => resolve_go(specifier, files),
        "java" => resolve_java(specifier, files),
        "rust" => resolve_rust(from_file, specifier),
        "c" | "cpp" => resolve_c(from_file, specifier, files),
        "csharp" => resolve_csharp(specifier, files),
        _ => Vec::new(),
    };
    candidates.into_iter().find(|c| files.contains(c))
}

/// Normalize `.` / `..` components of a joined path.
fn normalize(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(p) => parts.push(p.to_string_lossy().to_string()),
            Component::ParentDir => {
                parts.pop();
            }
            _ => {}
        }
    }
    parts.join("/")
}

fn parent_dir(from_file: &str) -> PathBuf {
    Path::new(from_file)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

fn resolve_js(from_file: &str, spec: &str) -> Vec<String> {
    // Bare specifiers are external packages
    if !spec.starts_with('.') {
        return Vec::new();
    }
    let base = normalize(&parent_dir(from_file).join(spec));
    let mut candidates = Vec::new();
    const EXTS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];
    if Path::new(&base).extension().is_some() {
        candidates.push(base.clone());
    }
    for ext in EXTS {
        candidates.push(format!("{base}.{ext}"));
    }
    for ext in EXTS {
        candidates.push(format!("{base}/index.{ext}"));
    }
    candidates
}

fn resolve_python(spec: &str, files: &HashSet<String>) -> Vec<String> {
    // Relative imports ("from .sibling import x") keep their dots; strip
    // them and resolve against every package directory that matches.
    let dotted = spec.trim_start_matches('.');
    if dotted.is_empty() {
        return Vec::new();
    }
    let rel = dotted.replace('.', "/");
    let mut candidates = vec![
        format!("{rel}.py"),
        format!("{rel}/__init__.py"),
        format!("src/{rel}.py"),
        format!("src/{rel}/__init__.py"),
    ];
    // Suffix match covers deeper source layouts
    candidates.extend(
        files
            .iter()
            .filter(|f| f.ends_with(&format!("/{rel}.py")))
            .cloned(),
    );
    candidates
}

fn resolve_go(spec: &str, files: &HashSet<String>) -> Vec<String> {
    let last = spec.rsplit('/').next().unwrap_or(spec);
    if last.is_empty() {
        return Vec::new();
    }
    // Any .go file directly inside a directory named after the last segment
    let mut matches: Vec<String> = files
        .iter()
        .filter(|f| {
            f.ends_with(".go")
                && Path::new(f)
                    .parent()
                    .and_then(Path::file_name)
                    .is_some_and(|d| d == std::ffi::OsStr::new(last))
        })
        .cloned()
        .collect();
    matches.sort();
    matches
}

fn resolve_java(spec: &str, files: &HashSet<String>) -> Vec<String> {
    let rel = format!("{}.java", spec.replace('.', "/"));
    let mut candidates = vec![rel.clone()];
    candidates.extend(
        files
            .iter()
            .filter(|f| f.ends_with(&format!("/{rel}")))
            .cloned(),
    );
    candidates.sort();
    candidates
}

fn resolve_rust(from_file: &str, spec: &str) -> Vec<String> {
    if let Some(name) = spec.strip_prefix("mod ") {
        let dir = normalize(&parent_dir(from_file));
        let prefix = if dir.is_empty() { String::new() } else { format!("{dir}/") };
        return vec![
            format!("{prefix}{name}.rs"),
            format!("{prefix}{name}/mod.rs"),
        ];
    }

    let segments: Vec<&str> = spec.split("::").collect();
    let (base, rest): (PathBuf, &[&str]) = match segments.first() {
        Some(&"crate") => (PathBuf::from("src"), &segments[1..]),
        Some(&"super") => {
            let mut dir = parent_dir(from_file);
            dir.pop();
            (dir, &segments[1..])
        }
        Some(&"self") => (parent_dir(from_file), &segments[1..]),
        // Leading plain segment: a sibling module
        Some(_) => (parent_dir(from_file), &segments[..]),
        None => return Vec::new(),
    };
    if rest.is_empty() {
        return Vec::new();
    }

    // Probe successively shorter prefixes: the tail segments may be items
    // rather than modules.
    let mut candidates = Vec::new();
    for take in (1..=rest.len()).rev() {
        let rel = rest[..take].join("/");
        let joined = normalize(&base.join(&rel));
        candidates.push(format!("{joined}.rs"));
        candidates.push(format!("{joined}/mod.rs"));
    }
    candidates
}

fn resolve_c(from_file: &str, spec: &str, files: &HashSet<String>) -> Vec<String> {
    let mut candidates = vec![normalize(&parent_dir(from_file).join(spec))];
    // Configured include roots reduce to suffix matching in practice
    candidates.extend(
        files
            .iter()
            .filter(|f| f.ends_with(&format!("/{spec}")) || f.as_str() == spec)
            .cloned(),
    );
    candidates.sort();
    candidates.dedup();
    candidates
}

fn resolve_csharp(spec: &str, files: &HashSet<String>) -> Vec<String> {
    let rel = spec.replace('.', "/");
    let mut candidates = vec![format!("{rel}.cs")];
    candidates.extend(
        files
            .iter()
            .filter(|f| f.ends_with(&format!("/{rel}.cs")))
            .cloned(),
    );
    // The namespace's last segment often names the directory, not the file
    if let Some(last) = spec.rsplit('.').next() {
        let mut dir_matches: Vec<String> = files
            .iter()
            .filter(|f| {
                f.ends_with(".cs")
                    && Path::new(f)
                        .parent()
                        .and_then(Path::file_name)
                        .is_some_and(|d| d == std::ffi::OsStr::new(last))
            })
            .cloned()
            .collect();
        dir_matches.sort();
        candidates.extend(dir_matches);
    }
    candidates
}

//! Language detection and per-language chunking specifications.
//!
//! Each supported language carries a declarative [`ChunkSpec`] naming the
//! syntax-tree node kinds that become chunks and the node kinds that form
//! the breadcrumb context. Dispatch is a tagged enum rather than open
//! inheritance, so adding a language means adding a variant and a spec.

use serde::{Deserialize, Serialize};

/// Supported programming languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    TypeScript,
    Tsx,
    JavaScript,
    Python,
    Go,
    Java,
    Rust,
    C,
    Cpp,
    CSharp,
}

impl Language {
    /// Detect language from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "ts" | "mts" | "cts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "py" | "pyi" => Some(Language::Python),
            "go" => Some(Language::Go),
            "java" => Some(Language::Java),
            "rs" => Some(Language::Rust),
            "c" | "h" => Some(Language::C),
            "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => Some(Language::Cpp),
            "cs" => Some(Language::CSharp),
            _ => None,
        }
    }

    /// Detect language from file path
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Language tag recorded in file records and chunks
    pub fn tag(&self) -> &'static str {
        match self {
            Language::TypeScript | Language::Tsx => "typescript",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Go => "go",
            Language::Java => "java",
            Language::Rust => "rust",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
        }
    }

    /// Load the tree-sitter grammar for this language
    pub fn grammar(&self) -> tree_sitter::Language {
        match self {
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
            Language::Java => tree_sitter_java::LANGUAGE.into(),
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
            Language::C => tree_sitter_c::LANGUAGE.into(),
            Language::Cpp => tree_sitter_cpp::LANGUAGE.into(),
            Language::CSharp => tree_sitter_c_sharp::LANGUAGE.into(),
        }
    }

    /// The chunking specification for this language
    pub fn chunk_spec(&self) -> &'static ChunkSpec {
        match self {
            Language::TypeScript | Language::Tsx => &TYPESCRIPT_SPEC,
            Language::JavaScript => &JAVASCRIPT_SPEC,
            Language::Python => &PYTHON_SPEC,
            Language::Go => &GO_SPEC,
            Language::Java => &JAVA_SPEC,
            Language::Rust => &RUST_SPEC,
            Language::C => &C_SPEC,
            Language::Cpp => &CPP_SPEC,
            Language::CSharp => &CSHARP_SPEC,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Declarative chunking rules for one language.
///
/// `chunkable` kinds are emitted as chunks; `context` kinds contribute a
/// breadcrumb component and are descended into when they contain further
/// chunkable nodes. A kind may appear in both lists: small leaf instances
/// are emitted whole, container instances are split.
#[derive(Debug)]
pub struct ChunkSpec {
    /// Node kinds emitted as chunks
    pub chunkable: &'static [&'static str],
    /// Node kinds forming breadcrumb context
    pub context: &'static [&'static str],
}

impl ChunkSpec {
    pub fn is_chunkable(&self, kind: &str) -> bool {
        self.chunkable.contains(&kind)
    }

    pub fn is_context(&self, kind: &str) -> bool {
        self.context.contains(&kind)
    }
}

static TYPESCRIPT_SPEC: ChunkSpec = ChunkSpec {
    chunkable: &[
        "function_declaration",
        "generator_function_declaration",
        "class_declaration",
        "abstract_class_declaration",
        "method_definition",
        "interface_declaration",
        "enum_declaration",
        "type_alias_declaration",
        "internal_module",
        "module",
    ],
    context: &[
        "class_declaration",
        "abstract_class_declaration",
        "internal_module",
        "module",
    ],
};

static JAVASCRIPT_SPEC: ChunkSpec = ChunkSpec {
    chunkable: &[
        "function_declaration",
        "generator_function_declaration",
        "class_declaration",
        "method_definition",
    ],
    context: &["class_declaration"],
};

static PYTHON_SPEC: ChunkSpec = ChunkSpec {
    chunkable: &[
        "function_definition",
        "class_definition",
        "decorated_definition",
    ],
    context: &["class_definition"],
};

static GO_SPEC: ChunkSpec = ChunkSpec {
    chunkable: &[
        "function_declaration",
        "method_declaration",
        "type_declaration",
    ],
    context: &[],
};

static JAVA_SPEC: ChunkSpec = ChunkSpec {
    chunkable: &[
        "class_declaration",
        "interface_declaration",
        "enum_declaration",
        "record_declaration",
        "annotation_type_declaration",
        "method_declaration",
        "constructor_declaration",
    ],
    context: &[
        "class_declaration",
        "interface_declaration",
        "enum_declaration",
        "record_declaration",
    ],
};

static RUST_SPEC: ChunkSpec = ChunkSpec {
    chunkable: &[
        "function_item",
        "struct_item",
        "enum_item",
        "union_item",
        "trait_item",
        "impl_item",
        "mod_item",
        "macro_definition",
        "type_item",
    ],
    context: &["mod_item", "impl_item", "trait_item"],
};

static C_SPEC: ChunkSpec = ChunkSpec {
    chunkable: &[
        "function_definition",
        "struct_specifier",
        "enum_specifier",
        "union_specifier",
        "type_definition",
    ],
    context: &[],
};

static CPP_SPEC: ChunkSpec = ChunkSpec {
    chunkable: &[
        "function_definition",
        "class_specifier",
        "struct_specifier",
        "enum_specifier",
        "union_specifier",
        "template_declaration",
        "namespace_definition",
    ],
    context: &["class_specifier", "struct_specifier", "namespace_definition"],
};

static CSHARP_SPEC: ChunkSpec = ChunkSpec {
    chunkable: &[
        "class_declaration",
        "interface_declaration",
        "struct_declaration",
        "enum_declaration",
        "record_declaration",
        "method_declaration",
        "constructor_declaration",
        "namespace_declaration",
    ],
    context: &[
        "namespace_declaration",
        "class_declaration",
        "interface_declaration",
        "struct_declaration",
        "record_declaration",
    ],
};

/// Extract the display name of a declaration node for breadcrumbs.
///
/// Most grammars expose a `name` field; C-family function definitions
/// expose the identifier through nested declarators instead.
pub fn node_name(node: tree_sitter::Node, source: &str) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return Some(source[name.byte_range()].to_string());
    }
    // Rust impl blocks: use the implemented type (plus trait when present)
    if node.kind() == "impl_item" {
        let ty = node
            .child_by_field_name("type")
            .map(|n| source[n.byte_range()].to_string())?;
        return match node.child_by_field_name("trait") {
            Some(tr) => Some(format!("{} for {}", &source[tr.byte_range()], ty)),
            None => Some(ty),
        };
    }
    // C/C++ function definitions: descend through declarators to the identifier
    if let Some(decl) = node.child_by_field_name("declarator") {
        return declarator_name(decl, source);
    }
    None
}

fn declarator_name(node: tree_sitter::Node, source: &str) -> Option<String> {
    match node.kind() {
        "identifier" | "field_identifier" | "qualified_identifier" | "destructor_name"
        | "operator_name" => Some(source[node.byte_range()].to_string()),
        _ => {
            if let Some(inner) = node.child_by_field_name("declarator") {
                return declarator_name(inner, source);
            }
            let mut cursor = node.walk();
            let children: Vec<_> = node.named_children(&mut cursor).collect();
            children.into_iter().find_map(|c| declarator_name(c, source))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn language_from_extension() {
        assert_eq!(Language::from_extension("rs"), Some(Language::Rust));
        assert_eq!(Language::from_extension("RS"), Some(Language::Rust));
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        assert_eq!(Language::from_extension("ts"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("tsx"), Some(Language::Tsx));
        assert_eq!(Language::from_extension("cc"), Some(Language::Cpp));
        assert_eq!(Language::from_extension("cs"), Some(Language::CSharp));
        assert_eq!(Language::from_extension("txt"), None);
    }

    #[test]
    fn language_from_path() {
        assert_eq!(
            Language::from_path(Path::new("src/lib.rs")),
            Some(Language::Rust)
        );
        assert_eq!(
            Language::from_path(Path::new("app/Main.java")),
            Some(Language::Java)
        );
        assert_eq!(Language::from_path(Path::new("README.md")), None);
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn tsx_shares_typescript_tag() {
        assert_eq!(Language::Tsx.tag(), "typescript");
        assert_eq!(Language::TypeScript.tag(), "typescript");
    }

    #[test]
    fn every_language_has_a_spec() {
        for lang in [
            Language::TypeScript,
            Language::JavaScript,
            Language::Python,
            Language::Go,
            Language::Java,
            Language::Rust,
            Language::C,
            Language::Cpp,
            Language::CSharp,
        ] {
            assert!(!lang.chunk_spec().chunkable.is_empty(), "{lang}");
        }
    }

    #[test]
    fn context_kinds_are_subset_semantics() {
        // Containers that may be split must also be chunkable so small
        // instances are emitted whole.
        let spec = Language::Rust.chunk_spec();
        assert!(spec.is_chunkable("impl_item"));
        assert!(spec.is_context("impl_item"));
        assert!(!spec.is_context("function_item"));
    }
}

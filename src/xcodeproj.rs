//! Xcode project edits
//!
//! Adds a Swift package product to the first application target of a
//! `.xcodeproj` by editing `project.pbxproj` in place. The file is an old-style
//! property list:
//!
//! ```text
//! {
//!     objects = {
//!         <id> /* comment */ = { isa = PBXProject; targets = ( <id>, ); ... };
//!         ...
//!     };
//!     rootObject = <id>;
//! }
//! ```
//!
//! Edits are text insertions at offsets found by a small parser, so everything
//! the tool does not touch (comments, ordering, formatting) is left as Xcode
//! wrote it.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const PROJECT_FILE: &str = "project.pbxproj";

/// `dstSubfolderSpec` of the Frameworks folder of an app bundle
const FRAMEWORKS_FOLDER: &str = "10";

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Failed to read project {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write project {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed project file at byte {offset}: {message}")]
    Malformed { offset: usize, message: String },

    #[error("Project file has no root object")]
    MissingRootObject,

    #[error("Project has no application target")]
    NoTarget,

    #[error("Product '{product}' is not a dependency of the project")]
    MissingProductDependency { product: String },
}

/// How the package is pinned in the project
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageRequirement {
    Local(PathBuf),
    ExactVersion { url: String, version: String },
    Revision { url: String, revision: String },
}

pub trait ProjectMutator: Send + Sync {
    /// Link `product_name` from `package` into the first target of `project`
    fn add_dependency(
        &self,
        project: &Path,
        package: &PackageRequirement,
        product_name: &str,
    ) -> Result<(), ProjectError>;

    /// Copy an already added product into the app bundle's Frameworks folder
    fn embed_as_framework(&self, project: &Path, product_name: &str) -> Result<(), ProjectError>;
}

/// Edits `project.pbxproj` directly
pub struct PbxprojMutator;

impl ProjectMutator for PbxprojMutator {
    fn add_dependency(
        &self,
        project: &Path,
        package: &PackageRequirement,
        product_name: &str,
    ) -> Result<(), ProjectError> {
        let path = project.join(PROJECT_FILE);
        let mut doc = Document::read(&path)?;
        let root = doc.root_object()?;
        let target = doc.first_target(&root)?;

        let package_id = doc.generate_id(&format!("package:{}", product_name));
        let (package_isa, package_comment, package_fields) = package_object(package);
        doc.insert_object(package_isa, &package_id, &package_comment, &package_fields)?;
        doc.append_to_list(
            &root,
            "packageReferences",
            &format!("{} /* {} */", package_id, package_comment),
        )?;

        let dependency_id = doc.generate_id(&format!("product:{}", product_name));
        doc.insert_object(
            "XCSwiftPackageProductDependency",
            &dependency_id,
            product_name,
            &[
                (
                    "package",
                    format!("{} /* {} */", package_id, package_comment),
                ),
                ("productName", quote(product_name)),
            ],
        )?;
        doc.append_to_list(
            &target,
            "packageProductDependencies",
            &format!("{} /* {} */", dependency_id, product_name),
        )?;

        let build_file_id = doc.generate_id(&format!("link:{}", product_name));
        let build_file_comment = format!("{} in Frameworks", product_name);
        doc.insert_object(
            "PBXBuildFile",
            &build_file_id,
            &build_file_comment,
            &[(
                "productRef",
                format!("{} /* {} */", dependency_id, product_name),
            )],
        )?;

        let phase = match doc.find_phase(&target, "PBXFrameworksBuildPhase", |_| true) {
            Some(phase) => phase,
            None => {
                let phase = doc.generate_id("phase:frameworks");
                doc.insert_object(
                    "PBXFrameworksBuildPhase",
                    &phase,
                    "Frameworks",
                    &[
                        ("buildActionMask", "2147483647".to_string()),
                        ("files", "(\n\t\t\t)".to_string()),
                        ("runOnlyForDeploymentPostprocessing", "0".to_string()),
                    ],
                )?;
                doc.append_to_list(&target, "buildPhases", &format!("{} /* Frameworks */", phase))?;
                phase
            }
        };
        doc.append_to_list(
            &phase,
            "files",
            &format!("{} /* {} */", build_file_id, build_file_comment),
        )?;

        debug!(project = %path.display(), product_name, "Added package dependency");
        doc.write(&path)
    }

    fn embed_as_framework(&self, project: &Path, product_name: &str) -> Result<(), ProjectError> {
        let path = project.join(PROJECT_FILE);
        let mut doc = Document::read(&path)?;
        let root = doc.root_object()?;
        let target = doc.first_target(&root)?;

        let dependency_id = doc
            .find_object(|object| {
                isa(object) == Some("XCSwiftPackageProductDependency")
                    && object.get("productName").and_then(Value::as_str) == Some(product_name)
            })
            .ok_or_else(|| ProjectError::MissingProductDependency {
                product: product_name.to_string(),
            })?;

        let build_file_id = doc.generate_id(&format!("embed:{}", product_name));
        let build_file_comment = format!("{} in Embed Frameworks", product_name);
        doc.insert_object(
            "PBXBuildFile",
            &build_file_id,
            &build_file_comment,
            &[
                (
                    "productRef",
                    format!("{} /* {} */", dependency_id, product_name),
                ),
                (
                    "settings",
                    "{ATTRIBUTES = (CodeSignOnCopy, ); }".to_string(),
                ),
            ],
        )?;

        let embeds_frameworks = |object: &Value| {
            object.get("dstSubfolderSpec").and_then(Value::as_str) == Some(FRAMEWORKS_FOLDER)
        };
        let phase = match doc.find_phase(&target, "PBXCopyFilesBuildPhase", embeds_frameworks) {
            Some(phase) => phase,
            None => {
                let phase = doc.generate_id("phase:embed");
                doc.insert_object(
                    "PBXCopyFilesBuildPhase",
                    &phase,
                    "Embed Frameworks",
                    &[
                        ("buildActionMask", "2147483647".to_string()),
                        ("dstPath", "\"\"".to_string()),
                        ("dstSubfolderSpec", FRAMEWORKS_FOLDER.to_string()),
                        ("files", "(\n\t\t\t)".to_string()),
                        ("name", quote("Embed Frameworks")),
                        ("runOnlyForDeploymentPostprocessing", "0".to_string()),
                    ],
                )?;
                doc.append_to_list(
                    &target,
                    "buildPhases",
                    &format!("{} /* Embed Frameworks */", phase),
                )?;
                phase
            }
        };
        doc.append_to_list(
            &phase,
            "files",
            &format!("{} /* {} */", build_file_id, build_file_comment),
        )?;

        debug!(project = %path.display(), product_name, "Embedded framework");
        doc.write(&path)
    }
}

fn package_object(package: &PackageRequirement) -> (&'static str, String, Vec<(&'static str, String)>) {
    match package {
        PackageRequirement::Local(path) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            (
                "XCLocalSwiftPackageReference",
                format!("XCLocalSwiftPackageReference \"{}\"", name),
                vec![("relativePath", quote(&path.to_string_lossy()))],
            )
        }
        PackageRequirement::ExactVersion { url, version } => (
            "XCRemoteSwiftPackageReference",
            format!(
                "XCRemoteSwiftPackageReference \"{}\"",
                crate::reference::repository_name(url)
            ),
            vec![
                ("repositoryURL", quote(url)),
                (
                    "requirement",
                    format!("{{kind = exactVersion; version = {}; }}", quote(version)),
                ),
            ],
        ),
        PackageRequirement::Revision { url, revision } => (
            "XCRemoteSwiftPackageReference",
            format!(
                "XCRemoteSwiftPackageReference \"{}\"",
                crate::reference::repository_name(url)
            ),
            vec![
                ("repositoryURL", quote(url)),
                (
                    "requirement",
                    format!("{{kind = revision; revision = {}; }}", quote(revision)),
                ),
            ],
        ),
    }
}

/// Quote a string unless it is a plain word
fn quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | '/'));
    if plain {
        s.to_string()
    } else {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

fn unquote(s: &str) -> String {
    match s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => s.to_string(),
    }
}

fn malformed(offset: usize, message: &str) -> ProjectError {
    ProjectError::Malformed {
        offset,
        message: message.to_string(),
    }
}

fn isa(object: &Value) -> Option<&str> {
    object.get("isa").and_then(Value::as_str)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Word,
    Punct(u8),
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: Kind,
    start: usize,
    end: usize,
}

fn tokenize(text: &str) -> Result<Vec<Token>, ProjectError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
        } else if bytes[i..].starts_with(b"/*") {
            let end = text[i + 2..]
                .find("*/")
                .ok_or_else(|| malformed(i, "unterminated comment"))?;
            i += 2 + end + 2;
        } else if bytes[i..].starts_with(b"//") {
            i = text[i..].find('\n').map_or(bytes.len(), |n| i + n);
        } else if b"{}();=,".contains(&c) {
            tokens.push(Token {
                kind: Kind::Punct(c),
                start: i,
                end: i + 1,
            });
            i += 1;
        } else if c == b'"' {
            let start = i;
            i += 1;
            loop {
                match bytes.get(i) {
                    None => return Err(malformed(start, "unterminated string")),
                    Some(b'\\') => i += 2,
                    Some(b'"') => {
                        i += 1;
                        break;
                    }
                    Some(_) => i += 1,
                }
            }
            tokens.push(Token {
                kind: Kind::Word,
                start,
                end: i,
            });
        } else {
            let start = i;
            while i < bytes.len()
                && !bytes[i].is_ascii_whitespace()
                && !b"{}();=,\"".contains(&bytes[i])
            {
                i += 1;
            }
            tokens.push(Token {
                kind: Kind::Word,
                start,
                end: i,
            });
        }
    }

    Ok(tokens)
}

/// Parsed value. Containers keep the offset of their closing bracket.
#[derive(Debug, Clone)]
enum Value {
    Scalar(String),
    List { items: Vec<Value>, close: usize },
    Dict { fields: Vec<(String, Value)>, close: usize },
}

impl Value {
    fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Dict { fields, .. } => fields.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn next(&mut self) -> Result<Token, ProjectError> {
        let token = self
            .tokens
            .get(self.pos)
            .copied()
            .ok_or_else(|| malformed(self.text.len(), "unexpected end of file"))?;
        self.pos += 1;
        Ok(token)
    }

    fn peek_is(&self, punct: u8) -> bool {
        self.tokens
            .get(self.pos)
            .is_some_and(|t| t.kind == Kind::Punct(punct))
    }

    fn expect(&mut self, punct: u8) -> Result<(), ProjectError> {
        let token = self.next()?;
        if token.kind == Kind::Punct(punct) {
            Ok(())
        } else {
            Err(malformed(
                token.start,
                &format!("expected '{}'", punct as char),
            ))
        }
    }

    fn value(&mut self) -> Result<Value, ProjectError> {
        let token = self.next()?;
        match token.kind {
            Kind::Word => Ok(Value::Scalar(unquote(&self.text[token.start..token.end]))),
            Kind::Punct(b'{') => {
                let mut fields = Vec::new();
                loop {
                    if self.peek_is(b'}') {
                        let close = self.next()?.start;
                        return Ok(Value::Dict { fields, close });
                    }
                    let key = self.next()?;
                    if key.kind != Kind::Word {
                        return Err(malformed(key.start, "expected key"));
                    }
                    self.expect(b'=')?;
                    let value = self.value()?;
                    self.expect(b';')?;
                    fields.push((unquote(&self.text[key.start..key.end]), value));
                }
            }
            Kind::Punct(b'(') => {
                let mut items = Vec::new();
                loop {
                    if self.peek_is(b')') {
                        let close = self.next()?.start;
                        return Ok(Value::List { items, close });
                    }
                    items.push(self.value()?);
                    if self.peek_is(b',') {
                        self.pos += 1;
                    } else if !self.peek_is(b')') {
                        return Err(malformed(token.start, "expected ',' in list"));
                    }
                }
            }
            Kind::Punct(_) => Err(malformed(token.start, "unexpected punctuation")),
        }
    }
}

/// Project text plus its parse, refreshed after every edit
struct Document {
    text: String,
    root: Value,
}

impl Document {
    fn parse(text: String) -> Result<Self, ProjectError> {
        let tokens = tokenize(&text)?;
        let mut parser = Parser {
            text: &text,
            tokens,
            pos: 0,
        };
        let root = parser.value()?;
        Ok(Self { text, root })
    }

    fn read(path: &Path) -> Result<Self, ProjectError> {
        let text = std::fs::read_to_string(path).map_err(|source| ProjectError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(text)
    }

    fn write(&self, path: &Path) -> Result<(), ProjectError> {
        std::fs::write(path, &self.text).map_err(|source| ProjectError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    fn objects(&self) -> &[(String, Value)] {
        match self.root.get("objects") {
            Some(Value::Dict { fields, .. }) => fields,
            _ => &[],
        }
    }

    fn object(&self, id: &str) -> Option<&Value> {
        self.objects().iter().find(|(k, _)| k == id).map(|(_, v)| v)
    }

    fn find_object(&self, predicate: impl Fn(&Value) -> bool) -> Option<String> {
        self.objects()
            .iter()
            .find(|(_, object)| predicate(object))
            .map(|(id, _)| id.clone())
    }

    /// Id of the `PBXProject` object
    fn root_object(&self) -> Result<String, ProjectError> {
        let id = self
            .root
            .get("rootObject")
            .and_then(Value::as_str)
            .ok_or(ProjectError::MissingRootObject)?;
        match self.object(id) {
            Some(object) if isa(object) == Some("PBXProject") => Ok(id.to_string()),
            _ => Err(ProjectError::MissingRootObject),
        }
    }

    fn first_target(&self, root: &str) -> Result<String, ProjectError> {
        self.list_ids(root, "targets")
            .into_iter()
            .find(|id| {
                self.object(id)
                    .is_some_and(|o| isa(o) == Some("PBXNativeTarget"))
            })
            .ok_or(ProjectError::NoTarget)
    }

    fn list_ids(&self, id: &str, key: &str) -> Vec<String> {
        match self.object(id).and_then(|o| o.get(key)) {
            Some(Value::List { items, .. }) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    fn find_phase(
        &self,
        target: &str,
        phase_isa: &str,
        predicate: impl Fn(&Value) -> bool,
    ) -> Option<String> {
        self.list_ids(target, "buildPhases").into_iter().find(|id| {
            self.object(id)
                .is_some_and(|o| isa(o) == Some(phase_isa) && predicate(o))
        })
    }

    /// A 24 digit hex id not present anywhere in the file
    fn generate_id(&self, seed: &str) -> String {
        let mut salt: u32 = 0;
        loop {
            let mut high = DefaultHasher::new();
            (seed, salt).hash(&mut high);
            let high = high.finish();
            let mut low = DefaultHasher::new();
            (salt, high, seed).hash(&mut low);
            let id = format!("{:016X}{:08X}", high, low.finish() as u32);
            if !self.text.contains(&id) {
                return id;
            }
            salt += 1;
        }
    }

    /// Add an object to its `/* Begin <isa> section */`, creating the section if needed
    fn insert_object(
        &mut self,
        object_isa: &str,
        id: &str,
        comment: &str,
        fields: &[(&str, String)],
    ) -> Result<(), ProjectError> {
        let mut rendered = format!(
            "\t\t{} /* {} */ = {{\n\t\t\tisa = {};\n",
            id, comment, object_isa
        );
        for (key, value) in fields {
            rendered.push_str(&format!("\t\t\t{} = {};\n", key, value));
        }
        rendered.push_str("\t\t};\n");

        let end_marker = format!("/* End {} section */", object_isa);
        if let Some(at) = self.text.find(&end_marker) {
            let line_start = line_start(&self.text, at);
            self.text.insert_str(line_start, &rendered);
        } else {
            let close = match self.root.get("objects") {
                Some(Value::Dict { close, .. }) => *close,
                _ => return Err(ProjectError::MissingRootObject),
            };
            let section = format!(
                "\n/* Begin {} section */\n{}{}\n",
                object_isa, rendered, end_marker
            );
            self.insert_before_close(close, &section);
        }
        self.reparse()
    }

    /// Append `item` to the list `key` of object `id`, creating the list if needed
    fn append_to_list(&mut self, id: &str, key: &str, item: &str) -> Result<(), ProjectError> {
        let object = self
            .object(id)
            .ok_or_else(|| malformed(0, &format!("object {} not found", id)))?;

        let (close, block) = match (object.get(key), object) {
            (Some(Value::List { close, .. }), _) => (*close, format!("\t\t\t\t{},\n", item)),
            (Some(_), _) => return Err(malformed(0, &format!("{} of {} is not a list", key, id))),
            (None, Value::Dict { close, .. }) => (
                *close,
                format!("\t\t\t{} = (\n\t\t\t\t{},\n\t\t\t);\n", key, item),
            ),
            (None, _) => return Err(malformed(0, &format!("object {} is not a dictionary", id))),
        };
        self.insert_before_close(close, &block);
        self.reparse()
    }

    /// Insert whole lines before the bracket at `close`
    fn insert_before_close(&mut self, close: usize, block: &str) {
        let start = line_start(&self.text, close);
        if self.text[start..close].trim().is_empty() {
            self.text.insert_str(start, block);
        } else {
            self.text.insert_str(close, &format!("\n{}", block));
        }
    }

    fn reparse(&mut self) -> Result<(), ProjectError> {
        *self = Self::parse(std::mem::take(&mut self.text))?;
        Ok(())
    }
}

fn line_start(text: &str, offset: usize) -> usize {
    text[..offset].rfind('\n').map_or(0, |n| n + 1)
}

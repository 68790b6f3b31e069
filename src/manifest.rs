//! Manifest files describing what to check
//!
//! A manifest declares the host types templates are rendered with, the
//! functions made available through `Funcs`, where the template files live
//! and which templates to check against which data type:
//!
//! ```toml
//! package = "example.com/app"
//!
//! [types.Person]
//! fields = [{ name = "Name", type = "string" }]
//! methods = { Greet = "(string) string" }
//!
//! [functions]
//! upper = "func(string) string"
//!
//! [templates]
//! variant = "html"
//! files = ["templates/*.gohtml"]
//!
//! [[check]]
//! template = "index.gohtml"
//! data = "*Person"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use toml::Spanned;

use crate::check::Checker;
use crate::diagnostic::{line_col, Diagnostic, Location};
use crate::host::{parse_signature, parse_type, Field, Method, TypeExprError, TypeId, TypeTable};
use crate::template::{base_name, new_template, Bundle, BundleError, Functions, ParseFsError, Template, TemplateError, Variant};
use crate::Report;

/// Errors that can occur when loading or building a manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse manifest TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid type for {context}: {source}")]
    TypeExpr {
        context: String,
        #[source]
        source: TypeExprError,
    },

    #[error("type {name} needs either fields, underlying or interface, not several")]
    ConflictingDecl { name: String },

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl From<ParseFsError> for ManifestError {
    fn from(error: ParseFsError) -> Self {
        match error {
            ParseFsError::Bundle(e) => ManifestError::Bundle(e),
            ParseFsError::Template(e) => ManifestError::Template(e),
        }
    }
}

/// A declared named type
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDecl {
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    /// Method name to signature, e.g. `"(int) (string, error)"`
    #[serde(default)]
    pub methods: BTreeMap<String, String>,
    /// Underlying type of a non-struct named type
    pub underlying: Option<String>,
    /// Method set of an interface type
    pub interface: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    /// Defaults to the type name for embedded fields
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub embedded: bool,
}

/// Where templates come from
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateSpec {
    #[serde(default)]
    pub variant: Variant,
    /// Defaults to the base name of the first matched file
    pub name: Option<String>,
    pub delims: Option<(String, String)>,
    /// Glob patterns relative to the manifest directory
    #[serde(default)]
    pub files: Vec<String>,
}

/// A registered function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub ty: String,
    pub location: Location,
}

/// A template to check and the type of data it is rendered with
#[derive(Debug, Clone, PartialEq)]
pub struct CheckSpec {
    pub template: String,
    pub data: String,
    pub location: Location,
}

/// TOML structure for deserializing manifests
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlManifest {
    #[serde(default)]
    package: String,
    #[serde(default)]
    types: BTreeMap<String, TypeDecl>,
    #[serde(default)]
    functions: BTreeMap<String, Spanned<String>>,
    #[serde(default)]
    templates: TemplateSpec,
    #[serde(default)]
    check: Vec<TomlCheck>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlCheck {
    template: Spanned<String>,
    data: String,
}

/// A parsed manifest
#[derive(Debug, Clone)]
pub struct Manifest {
    /// File name used in reported locations
    pub name: String,
    /// Import path qualifying declared type names
    pub package: String,
    pub types: BTreeMap<String, TypeDecl>,
    pub functions: Vec<FunctionDecl>,
    pub templates: TemplateSpec,
    pub checks: Vec<CheckSpec>,
}

/// A manifest with its types built and templates parsed
#[derive(Debug)]
pub struct Project {
    pub types: TypeTable,
    pub functions: Functions,
    pub template: Box<dyn Template>,
    /// Each check with its data type
    pub checks: Vec<(CheckSpec, TypeId)>,
    /// Rejected function registrations
    pub diagnostics: Vec<Diagnostic>,
}

impl Manifest {
    /// Load manifest from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&path.display().to_string(), &content)
    }

    /// Load manifest from TOML string
    pub fn from_str(content: &str) -> Result<Self, ManifestError> {
        Self::parse("manifest.toml", content)
    }

    fn parse(name: &str, content: &str) -> Result<Self, ManifestError> {
        let parsed: TomlManifest = toml::from_str(content)?;
        let locate = |span: std::ops::Range<usize>| {
            let (line, column) = line_col(content, span.start);
            Location::new(name, line, column + 1)
        };

        Ok(Manifest {
            name: name.to_string(),
            package: parsed.package,
            types: parsed.types,
            functions: parsed
                .functions
                .into_iter()
                .map(|(name, ty)| FunctionDecl {
                    name,
                    location: locate(ty.span()),
                    ty: ty.into_inner(),
                })
                .collect(),
            templates: parsed.templates,
            checks: parsed
                .check
                .into_iter()
                .map(|check| CheckSpec {
                    location: locate(check.template.span()),
                    template: check.template.into_inner(),
                    data: check.data,
                })
                .collect(),
        })
    }

    /// Read the template files from under `root`
    pub fn load_bundle(&self, root: &Path) -> Result<Bundle, ManifestError> {
        if self.templates.files.is_empty() {
            return Ok(Bundle::new());
        }
        Ok(Bundle::from_dir(root, &self.templates.files)?)
    }

    /// Build the declared types into a fresh table
    pub fn build_types(&self) -> Result<(TypeTable, BTreeMap<String, TypeId>), ManifestError> {
        let mut table = TypeTable::new();
        let named: BTreeMap<String, TypeId> = self
            .types
            .keys()
            .map(|name| (name.clone(), table.declare_named(self.package.clone(), name.clone())))
            .collect();
        let resolve = |name: &str| named.get(name).copied();
        let type_error = |context: String| move |source: TypeExprError| ManifestError::TypeExpr { context, source };

        for (name, decl) in &self.types {
            let ty = named[name];
            let underlying = match (&decl.underlying, &decl.interface) {
                (Some(_), Some(_)) => return Err(ManifestError::ConflictingDecl { name: name.clone() }),
                (Some(_), None) | (None, Some(_)) if !decl.fields.is_empty() => {
                    return Err(ManifestError::ConflictingDecl { name: name.clone() })
                }
                (Some(source), None) => parse_type(&mut table, source, &resolve).map_err(type_error(name.clone()))?,
                (None, Some(methods)) => {
                    let mut set = Vec::with_capacity(methods.len());
                    for (method, source) in methods {
                        let signature = parse_signature(&mut table, source, &resolve)
                            .map_err(type_error(format!("{}.{}", name, method)))?;
                        set.push(Method::new(method.clone(), signature));
                    }
                    table.interface(set)
                }
                (None, None) => {
                    let mut fields = Vec::with_capacity(decl.fields.len());
                    for field in &decl.fields {
                        let field_ty = parse_type(&mut table, &field.ty, &resolve)
                            .map_err(type_error(format!("{}.{}", name, field.name.as_deref().unwrap_or(&field.ty))))?;
                        let field_name = field.name.clone().unwrap_or_else(|| embedded_name(&field.ty));
                        fields.push(if field.embedded {
                            Field::embedded(field_name, field_ty)
                        } else {
                            Field::new(field_name, field_ty)
                        });
                    }
                    table.structure(fields)
                }
            };
            table.set_underlying(ty, underlying);

            for (method, source) in &decl.methods {
                let signature = parse_signature(&mut table, source, &resolve)
                    .map_err(type_error(format!("{}.{}", name, method)))?;
                table.add_method(ty, Method::new(method.clone(), signature));
            }
        }
        Ok((table, named))
    }

    /// Build types and functions, then parse the templates from `bundle`
    pub fn build(&self, bundle: &Bundle) -> Result<Project, ManifestError> {
        let (mut types, named) = self.build_types()?;
        let resolve = |name: &str| named.get(name).copied();

        let mut functions = Functions::builtins();
        let mut diagnostics = Vec::new();
        for decl in &self.functions {
            let ty = parse_type(&mut types, &decl.ty, &resolve).map_err(|source| ManifestError::TypeExpr {
                context: format!("function {}", decl.name),
                source,
            })?;
            if let Err(error) = functions.register_type(&types, &decl.name, ty) {
                diagnostics.push(Diagnostic::new(decl.location.clone(), error.to_string()));
            }
        }

        let mut checks = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let data = parse_type(&mut types, &check.data, &resolve).map_err(|source| ManifestError::TypeExpr {
                context: format!("check of {}", check.template),
                source,
            })?;
            checks.push((check.clone(), data));
        }

        let template = self.build_template(bundle)?;
        Ok(Project {
            types,
            functions,
            template,
            checks,
            diagnostics,
        })
    }

    fn build_template(&self, bundle: &Bundle) -> Result<Box<dyn Template>, ManifestError> {
        let spec = &self.templates;
        let name = match (&spec.name, spec.files.is_empty()) {
            (Some(name), _) => name.clone(),
            (None, true) => self.name.clone(),
            (None, false) => {
                let paths = bundle.matches(&spec.files)?;
                paths.first().map_or_else(|| self.name.clone(), |path| base_name(path).to_string())
            }
        };

        let mut template = new_template(spec.variant, &name);
        if let Some((left, right)) = &spec.delims {
            template = template.delims(left, right);
        }
        let names: Vec<String> = self.functions.iter().map(|f| f.name.clone()).collect();
        template = template.funcs(&names);
        if !spec.files.is_empty() {
            template = bundle.parse_fs(Some(template.as_ref()), spec.variant, &spec.files)?;
        }
        Ok(template)
    }
}

/// Field name of an embedded type expression: `*pkg.Name` is `Name`
fn embedded_name(ty: &str) -> String {
    let ty = ty.trim_start_matches('*');
    ty.rsplit('.').next().unwrap_or(ty).to_string()
}

impl Project {
    /// Check every listed template
    ///
    /// A check naming a template that is not defined is a diagnostic.
    pub fn check(&self) -> Report {
        let mut report = Report::default();
        let mut seen: HashSet<Diagnostic> = self.diagnostics.iter().cloned().collect();
        report.diagnostics.extend(self.diagnostics.iter().cloned());

        for (spec, data) in &self.checks {
            let forest = self.template.forest();
            let Some(tree) = forest.get(&spec.template).cloned() else {
                let diagnostic = Diagnostic::new(
                    spec.location.clone(),
                    format!("template {:?} not defined", spec.template),
                );
                if seen.insert(diagnostic.clone()) {
                    report.diagnostics.push(diagnostic);
                }
                continue;
            };
            let mut checker = Checker::new(&self.types, forest, &self.functions);
            checker.record(spec.location.clone(), &spec.template, *data);
            checker.check(&tree, *data);
            let output = checker.finish();
            for diagnostic in output.diagnostics {
                if seen.insert(diagnostic.clone()) {
                    report.diagnostics.push(diagnostic);
                }
            }
            report.calls.extend(output.calls);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
package = "example.com/app"

[types.Person]
fields = [
    { name = "Name", type = "string" },
    { type = "*Address", embedded = true },
]
methods = { Greet = "(string) string" }

[types.Address]
fields = [{ name = "City", type = "string" }]

[types.Greeter]
interface = { Greet = "(string) string" }

[functions]
upper = "func(string) string"
pair = "func() (string, int)"

[templates]
variant = "html"
files = ["templates/*.gohtml"]

[[check]]
template = "index.gohtml"
data = "*Person"
"#;

    fn bundle() -> Bundle {
        Bundle::new()
            .with_file("templates/index.gohtml", "{{.Name | upper}} {{.City}} {{template \"nav.gohtml\" .}}")
            .with_file("templates/nav.gohtml", "{{.Greet \"hi\"}} {{.Zip}}")
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_str(MANIFEST).unwrap();
        assert_eq!(manifest.package, "example.com/app");
        assert_eq!(manifest.templates.variant, Variant::Html);
        assert_eq!(manifest.functions.len(), 2);
        assert_eq!(manifest.checks[0].location, Location::new("manifest.toml", 26, 12));
    }

    #[test]
    fn test_build_types() {
        let manifest = Manifest::from_str(MANIFEST).unwrap();
        let (table, named) = manifest.build_types().unwrap();
        let person = named["Person"];
        assert_eq!(table.display(person).to_string(), "example.com/app.Person");
        assert!(table.is_interface(named["Greeter"]));
        assert!(table.implements(person, named["Greeter"]));
    }

    #[test]
    fn test_project_check() {
        let manifest = Manifest::from_str(MANIFEST).unwrap();
        let project = manifest.build(&bundle()).unwrap();
        assert_eq!(project.template.name(), "index.gohtml");
        let report = project.check();
        let messages: Vec<String> = report.diagnostics.iter().map(|d| d.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                r#"manifest.toml:19:8: can't install function "pair": second result must be error, not int"#,
                "nav.gohtml:1:18: Zip not found on example.com/app.Person",
            ]
        );
        assert_eq!(report.calls.len(), 2);
    }

    #[test]
    fn test_unknown_type_and_unknown_key() {
        let manifest = Manifest::from_str("[[check]]\ntemplate = \"a\"\ndata = \"Missing\"\n").unwrap();
        assert!(matches!(
            manifest.build(&Bundle::new()),
            Err(ManifestError::TypeExpr { .. })
        ));
        assert!(matches!(
            Manifest::from_str("colour = 1"),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_template_is_reported() {
        let manifest = Manifest::from_str("[[check]]\ntemplate = \"a\"\ndata = \"string\"\n").unwrap();
        let report = manifest.build(&Bundle::new()).unwrap().check();
        assert_eq!(report.diagnostics[0].to_string(), r#"manifest.toml:2:12: template "a" not defined"#);
    }
}

// Schema front-end - external API types and operations derived from the registry

mod generate;

pub use generate::generate_schema;

use std::collections::BTreeMap;
use std::fmt::Write;

/// Reference to a named type, optionally a list of non-null items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub name: String,
    pub list: bool,
    pub nullable: bool,
}

impl TypeRef {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            list: false,
            nullable: true,
        }
    }

    pub fn list_of(name: &str) -> Self {
        Self {
            list: true,
            ..Self::named(name)
        }
    }

    pub fn non_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    fn render(&self) -> String {
        let base = if self.list {
            format!("[{}!]", self.name)
        } else {
            self.name.clone()
        };
        if self.nullable {
            base
        } else {
            format!("{}!", base)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDef {
    pub name: String,
    pub type_ref: TypeRef,
}

impl ArgumentDef {
    pub fn new(name: &str, type_ref: TypeRef) -> Self {
        Self {
            name: name.to_string(),
            type_ref,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub type_ref: TypeRef,
    pub args: Vec<ArgumentDef>,
}

impl FieldDef {
    pub fn new(name: &str, type_ref: TypeRef) -> Self {
        Self {
            name: name.to_string(),
            type_ref,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, name: &str, type_ref: TypeRef) -> Self {
        self.args.push(ArgumentDef::new(name, type_ref));
        self
    }

    fn render(&self) -> String {
        if self.args.is_empty() {
            return format!("{}: {}", self.name, self.type_ref.render());
        }
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| format!("{}: {}", a.name, a.type_ref.render()))
            .collect();
        format!("{}({}): {}", self.name, args.join(", "), self.type_ref.render())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDef {
    Scalar {
        description: Option<String>,
    },
    Enum {
        values: Vec<String>,
    },
    Union {
        members: Vec<String>,
    },
    Object {
        implements: Vec<String>,
        fields: Vec<FieldDef>,
    },
    Interface {
        fields: Vec<FieldDef>,
    },
    Input {
        fields: Vec<FieldDef>,
    },
}

impl TypeDef {
    pub fn fields(&self) -> &[FieldDef] {
        match self {
            TypeDef::Object { fields, .. } | TypeDef::Interface { fields } | TypeDef::Input { fields } => {
                fields
            }
            _ => &[],
        }
    }
}

/// Every generated type by name, plus the root query and mutation fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedSchema {
    pub types: BTreeMap<String, TypeDef>,
    pub queries: Vec<FieldDef>,
    pub mutations: Vec<FieldDef>,
}

impl GeneratedSchema {
    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDef> {
        self.types
            .get(type_name)?
            .fields()
            .iter()
            .find(|f| f.name == field_name)
    }

    pub fn query(&self, name: &str) -> Option<&FieldDef> {
        self.queries.iter().find(|f| f.name == name)
    }

    pub fn mutation(&self, name: &str) -> Option<&FieldDef> {
        self.mutations.iter().find(|f| f.name == name)
    }

    /// Render the schema as SDL, types in name order followed by the root types.
    pub fn to_sdl(&self) -> String {
        let mut sdl = String::new();
        for (name, def) in &self.types {
            match def {
                TypeDef::Scalar { description } => {
                    if let Some(description) = description {
                        let _ = writeln!(sdl, "\"\"\"{}\"\"\"", description);
                    }
                    let _ = writeln!(sdl, "scalar {}\n", name);
                }
                TypeDef::Enum { values } => {
                    let _ = writeln!(sdl, "enum {} {{", name);
                    for value in values {
                        let _ = writeln!(sdl, "  {}", value);
                    }
                    sdl.push_str("}\n\n");
                }
                TypeDef::Union { members } => {
                    let _ = writeln!(sdl, "union {} = {}\n", name, members.join(" | "));
                }
                TypeDef::Object { implements, fields } => {
                    let header = if implements.is_empty() {
                        format!("type {}", name)
                    } else {
                        format!("type {} implements {}", name, implements.join(" & "))
                    };
                    render_block(&mut sdl, &header, fields);
                }
                TypeDef::Interface { fields } => {
                    render_block(&mut sdl, &format!("interface {}", name), fields)
                }
                TypeDef::Input { fields } => render_block(&mut sdl, &format!("input {}", name), fields),
            }
        }
        if !self.queries.is_empty() {
            render_block(&mut sdl, "type Query", &self.queries);
        }
        if !self.mutations.is_empty() {
            render_block(&mut sdl, "type Mutation", &self.mutations);
        }
        sdl.trim_end().to_string()
    }
}

fn render_block(sdl: &mut String, header: &str, fields: &[FieldDef]) {
    let _ = writeln!(sdl, "{} {{", header);
    for field in fields {
        let _ = writeln!(sdl, "  {}", field.render());
    }
    sdl.push_str("}\n\n");
}

//! The module index: an arena over the types, methods and fields of one CIL module.
//!
//! The index is the mutable, structured view the host hands to the dispatcher. It never sees
//! raw bytes; the host's loader builds it through the `add_*` builders and its writer
//! serializes it again after a successful run.
//!
//! All cross references are ids into the arenas ([`TypeId`], [`MethodId`], [`FieldId`]).
//! Members are never removed, so ids stay valid for the lifetime of the module, and cloning the
//! module clones the whole graph without any pointer fix-ups. The dispatcher relies on that to
//! patch a working copy and only hand it back when every rule succeeded.
//!
//! # Naming
//!
//! Type names follow the Cecil convention: `Namespace.Outer/Nested`. Member names are
//! `Namespace.Type::Name`.
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::metadata::{
//!     field::FieldDef,
//!     method::{MethodBody, MethodDef},
//!     module::CilModule,
//! };
//!
//! let mut module = CilModule::new("Game");
//! let slot = module.add_type("Game", "Slot");
//! let submenu = module.add_nested_type(slot, "ISubmenu")?;
//! module.add_field(slot, FieldDef::new("renamed", "System.Boolean"))?;
//! let render = module.add_method(slot, MethodDef::new("Render", "System.Void").with_body(MethodBody::new()))?;
//!
//! assert_eq!(module.find_type("Game.Slot/ISubmenu"), Some(submenu));
//! assert_eq!(module.method_full_name(render), "Game.Slot::Render");
//! # Ok::<(), cilpatch::Error>(())
//! ```

use std::fmt;

use crate::{
    assembly::{MemberRef, OpCode},
    metadata::{
        customattributes::{
            CustomAttribute, CustomAttributeArgument, PatchRequest, ASYNC_STATE_MACHINE_ATTRIBUTE,
            ITERATOR_STATE_MACHINE_ATTRIBUTE,
        },
        field::FieldDef,
        identity::{AssemblyRef, HashAlgorithm},
        method::MethodDef,
        typedef::{TypeAttributes, TypeDef},
    },
    Error, Result,
};

/// Id of a type in a [`CilModule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Id of a method in a [`CilModule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

/// Id of a field in a [`CilModule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

/// Any member that can carry patch requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberId {
    /// A type
    Type(TypeId),
    /// A method
    Method(MethodId),
    /// A field
    Field(FieldId),
}

impl MemberId {
    /// `"type"`, `"method"` or `"field"`.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            MemberId::Type(_) => "type",
            MemberId::Method(_) => "method",
            MemberId::Field(_) => "field",
        }
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberId::Type(id) => write!(f, "type #{}", id.0),
            MemberId::Method(id) => write!(f, "method #{}", id.0),
            MemberId::Field(id) => write!(f, "field #{}", id.0),
        }
    }
}

/// Name of the step method of compiler-generated state machines.
pub const MOVE_NEXT: &str = "MoveNext";

/// An in-memory CIL module.
#[derive(Debug, Clone, PartialEq)]
pub struct CilModule {
    /// Module name
    pub name: String,
    types: Vec<TypeDef>,
    methods: Vec<MethodDef>,
    fields: Vec<FieldDef>,
    top_level: Vec<TypeId>,
    /// Designated entry point
    pub entry_point: Option<MethodId>,
    /// External reference table, in table order
    pub assembly_refs: Vec<AssemblyRef>,
    /// Resolved dependencies of this module, with their actual identity
    pub dependencies: Vec<AssemblyRef>,
    /// Assembly-level custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
    /// Hash algorithm of the assembly manifest, used to derive reference tokens
    pub hash_algorithm: HashAlgorithm,
}

impl CilModule {
    /// Creates an empty module.
    #[must_use]
    pub fn new(name: &str) -> Self {
        CilModule {
            name: name.to_string(),
            types: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            top_level: Vec::new(),
            entry_point: None,
            assembly_refs: Vec::new(),
            dependencies: Vec::new(),
            custom_attributes: Vec::new(),
            hash_algorithm: HashAlgorithm::Sha1,
        }
    }

    /// Adds a public top-level type.
    pub fn add_type(&mut self, namespace: &str, name: &str) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types
            .push(TypeDef::new(namespace, name, TypeAttributes::PUBLIC, None));
        self.top_level.push(id);
        id
    }

    /// Adds a nested type to `enclosing`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] if `enclosing` is not a type of this module.
    pub fn add_nested_type(&mut self, enclosing: TypeId, name: &str) -> Result<TypeId> {
        let id = TypeId(self.types.len() as u32);
        self.type_def_mut(enclosing)?.nested_types.push(id);
        self.types.push(TypeDef::new(
            "",
            name,
            TypeAttributes::NESTED_PRIVATE,
            Some(enclosing),
        ));
        Ok(id)
    }

    /// Adds a method to `ty`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] if `ty` is not a type of this module.
    pub fn add_method(&mut self, ty: TypeId, mut method: MethodDef) -> Result<MethodId> {
        let id = MethodId(self.methods.len() as u32);
        self.type_def_mut(ty)?.methods.push(id);
        method.declaring_type = ty;
        self.methods.push(method);
        Ok(id)
    }

    /// Adds a field to `ty`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] if `ty` is not a type of this module.
    pub fn add_field(&mut self, ty: TypeId, mut field: FieldDef) -> Result<FieldId> {
        let id = FieldId(self.fields.len() as u32);
        self.type_def_mut(ty)?.fields.push(id);
        field.declaring_type = ty;
        self.fields.push(field);
        Ok(id)
    }

    /// Top-level types, in declaration order.
    #[must_use]
    pub fn top_level_types(&self) -> &[TypeId] {
        &self.top_level
    }

    /// Number of types, including nested ones.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Number of methods.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Every type id, top-level types before their nested types, depth first.
    #[must_use]
    pub fn types_depth_first(&self) -> Vec<TypeId> {
        let mut out = Vec::with_capacity(self.types.len());
        let mut stack: Vec<TypeId> = self.top_level.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(ty) = self.types.get(id.0 as usize) {
                stack.extend(ty.nested_types.iter().rev().copied());
            }
        }
        out
    }

    /// Type by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for unknown ids.
    pub fn type_def(&self, id: TypeId) -> Result<&TypeDef> {
        self.types
            .get(id.0 as usize)
            .ok_or_else(|| Error::MemberNotFound(MemberId::Type(id).to_string()))
    }

    /// Mutable type by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for unknown ids.
    pub fn type_def_mut(&mut self, id: TypeId) -> Result<&mut TypeDef> {
        self.types
            .get_mut(id.0 as usize)
            .ok_or_else(|| Error::MemberNotFound(MemberId::Type(id).to_string()))
    }

    /// Method by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for unknown ids.
    pub fn method(&self, id: MethodId) -> Result<&MethodDef> {
        self.methods
            .get(id.0 as usize)
            .ok_or_else(|| Error::MemberNotFound(MemberId::Method(id).to_string()))
    }

    /// Mutable method by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for unknown ids.
    pub fn method_mut(&mut self, id: MethodId) -> Result<&mut MethodDef> {
        self.methods
            .get_mut(id.0 as usize)
            .ok_or_else(|| Error::MemberNotFound(MemberId::Method(id).to_string()))
    }

    /// Field by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for unknown ids.
    pub fn field(&self, id: FieldId) -> Result<&FieldDef> {
        self.fields
            .get(id.0 as usize)
            .ok_or_else(|| Error::MemberNotFound(MemberId::Field(id).to_string()))
    }

    /// Mutable field by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for unknown ids.
    pub fn field_mut(&mut self, id: FieldId) -> Result<&mut FieldDef> {
        self.fields
            .get_mut(id.0 as usize)
            .ok_or_else(|| Error::MemberNotFound(MemberId::Field(id).to_string()))
    }

    /// `Namespace.Outer/Nested`; unknown ids yield an empty string.
    #[must_use]
    pub fn type_full_name(&self, id: TypeId) -> String {
        let Some(ty) = self.types.get(id.0 as usize) else {
            return String::new();
        };
        match ty.enclosing {
            Some(outer) => format!("{}/{}", self.type_full_name(outer), ty.name),
            None if ty.namespace.is_empty() => ty.name.clone(),
            None => format!("{}.{}", ty.namespace, ty.name),
        }
    }

    /// `Namespace.Type::Method`
    #[must_use]
    pub fn method_full_name(&self, id: MethodId) -> String {
        match self.methods.get(id.0 as usize) {
            Some(method) => format!(
                "{}::{}",
                self.type_full_name(method.declaring_type),
                method.name
            ),
            None => MemberId::Method(id).to_string(),
        }
    }

    /// `Namespace.Type::Field`
    #[must_use]
    pub fn field_full_name(&self, id: FieldId) -> String {
        match self.fields.get(id.0 as usize) {
            Some(field) => format!(
                "{}::{}",
                self.type_full_name(field.declaring_type),
                field.name
            ),
            None => MemberId::Field(id).to_string(),
        }
    }

    /// Qualified name of any member.
    #[must_use]
    pub fn member_name(&self, member: MemberId) -> String {
        match member {
            MemberId::Type(id) => self.type_full_name(id),
            MemberId::Method(id) => self.method_full_name(id),
            MemberId::Field(id) => self.field_full_name(id),
        }
    }

    /// Looks a type up by its full name.
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<TypeId> {
        (0..self.types.len())
            .map(|i| TypeId(i as u32))
            .find(|id| self.type_full_name(*id) == full_name)
    }

    /// Looks a method of `ty` up by simple name or signature text; the first match in
    /// declaration order wins.
    #[must_use]
    pub fn find_method(&self, ty: TypeId, name_or_signature: &str) -> Option<MethodId> {
        let ty = self.types.get(ty.0 as usize)?;
        ty.methods.iter().copied().find(|id| {
            self.methods
                .get(id.0 as usize)
                .is_some_and(|m| m.matches(name_or_signature))
        })
    }

    /// Looks a field of `ty` up by name.
    #[must_use]
    pub fn find_field(&self, ty: TypeId, name: &str) -> Option<FieldId> {
        let ty = self.types.get(ty.0 as usize)?;
        ty.fields.iter().copied().find(|id| {
            self.fields
                .get(id.0 as usize)
                .is_some_and(|f| f.name == name)
        })
    }

    /// Resolves `Namespace.Type::Member` to a method, by name or signature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] if the type or the method does not exist.
    pub fn resolve_method(&self, qualified: &str) -> Result<MethodId> {
        let (ty, member) = split_member(qualified)?;
        self.find_type(ty)
            .and_then(|ty| self.find_method(ty, member))
            .ok_or_else(|| Error::MemberNotFound(qualified.to_string()))
    }

    /// Resolves `Namespace.Type::Field` to a field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] if the type or the field does not exist.
    pub fn resolve_field(&self, qualified: &str) -> Result<FieldId> {
        let (ty, member) = split_member(qualified)?;
        self.find_type(ty)
            .and_then(|ty| self.find_field(ty, member))
            .ok_or_else(|| Error::MemberNotFound(qualified.to_string()))
    }

    /// Builds an instruction operand that calls `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for unknown ids.
    pub fn method_ref(&self, id: MethodId) -> Result<MemberRef> {
        let method = self.method(id)?;
        Ok(MemberRef::method(
            &self.type_full_name(method.declaring_type),
            &method.name,
            &method.signature(),
        ))
    }

    /// Builds an instruction operand that loads or stores `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for unknown ids.
    pub fn field_ref(&self, id: FieldId) -> Result<MemberRef> {
        let field = self.field(id)?;
        Ok(MemberRef::field(
            &self.type_full_name(field.declaring_type),
            &field.name,
            &field.field_type,
        ))
    }

    /// Attaches a patch request to a member.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for unknown ids.
    pub fn request(&mut self, member: MemberId, request: PatchRequest) -> Result<()> {
        self.requests_mut(member)?.push(request);
        Ok(())
    }

    /// Pending patch requests of a member.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for unknown ids.
    pub fn requests(&self, member: MemberId) -> Result<&[PatchRequest]> {
        Ok(match member {
            MemberId::Type(id) => self.type_def(id)?.requests.as_slice(),
            MemberId::Method(id) => self.method(id)?.requests.as_slice(),
            MemberId::Field(id) => self.field(id)?.requests.as_slice(),
        })
    }

    /// Mutable pending patch requests of a member.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for unknown ids.
    pub fn requests_mut(&mut self, member: MemberId) -> Result<&mut Vec<PatchRequest>> {
        Ok(match member {
            MemberId::Type(id) => &mut self.type_def_mut(id)?.requests,
            MemberId::Method(id) => &mut self.method_mut(id)?.requests,
            MemberId::Field(id) => &mut self.field_mut(id)?.requests,
        })
    }

    /// Attaches a custom attribute to a member.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for unknown ids.
    pub fn add_custom_attribute(&mut self, member: MemberId, attr: CustomAttribute) -> Result<()> {
        match member {
            MemberId::Type(id) => self.type_def_mut(id)?.custom_attributes.push(attr),
            MemberId::Method(id) => self.method_mut(id)?.custom_attributes.push(attr),
            MemberId::Field(id) => self.field_mut(id)?.custom_attributes.push(attr),
        }
        Ok(())
    }

    /// Simple name of a member.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for unknown ids.
    pub fn simple_name(&self, member: MemberId) -> Result<&str> {
        Ok(match member {
            MemberId::Type(id) => self.type_def(id)?.name.as_str(),
            MemberId::Method(id) => self.method(id)?.name.as_str(),
            MemberId::Field(id) => self.field(id)?.name.as_str(),
        })
    }

    /// Renames a member.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] for unknown ids.
    pub fn rename(&mut self, member: MemberId, name: &str) -> Result<()> {
        let slot = match member {
            MemberId::Type(id) => &mut self.type_def_mut(id)?.name,
            MemberId::Method(id) => &mut self.method_mut(id)?.name,
            MemberId::Field(id) => &mut self.field_mut(id)?.name,
        };
        *slot = name.to_string();
        Ok(())
    }

    /// Resolves an iterator or async method to the `MoveNext` of its compiler-generated state
    /// machine.
    ///
    /// The state machine is taken, in order, from an `IteratorStateMachine`/`AsyncStateMachine`
    /// attribute, from a `newobj <Name>d__N::.ctor` in the method's own body, or from a nested
    /// type of the declaring type named `<Name>d__N`. The name lookup only applies to methods
    /// whose return type is an enumerator, enumerable or task, so an ordinary overload sharing
    /// the iterator's name keeps its own body. Returns `None` for ordinary methods.
    #[must_use]
    pub fn resolve_state_machine(&self, id: MethodId) -> Option<MethodId> {
        let method = self.methods.get(id.0 as usize)?;

        let from_attribute = method
            .custom_attributes
            .iter()
            .filter(|attr| {
                attr.type_name == ITERATOR_STATE_MACHINE_ATTRIBUTE
                    || attr.type_name == ASYNC_STATE_MACHINE_ATTRIBUTE
            })
            .find_map(|attr| match attr.fixed_args.first() {
                Some(CustomAttributeArgument::Type(name)) => self.find_type(name),
                _ => None,
            });

        let prefix = format!("<{}>d__", method.name);
        let machine = from_attribute
            .or_else(|| self.constructed_state_machine(method, &prefix))
            .or_else(|| {
                if !returns_state_machine(&method.return_type) {
                    return None;
                }
                self.types
                    .get(method.declaring_type.0 as usize)?
                    .nested_types
                    .iter()
                    .copied()
                    .find(|nested| {
                        self.types
                            .get(nested.0 as usize)
                            .is_some_and(|ty| ty.name.starts_with(&prefix))
                    })
            })?;

        self.find_method(machine, MOVE_NEXT)
    }

    /// The `<Name>d__N` type a method body instantiates with `newobj`.
    fn constructed_state_machine(&self, method: &MethodDef, prefix: &str) -> Option<TypeId> {
        method
            .body
            .as_ref()?
            .iter()
            .filter(|instr| instr.opcode == OpCode::Newobj)
            .filter_map(|instr| instr.operand.as_member())
            .filter(|ctor| ctor.name == ".ctor")
            .find_map(|ctor| {
                let simple = ctor
                    .declaring_type
                    .rsplit_once('/')
                    .map_or(ctor.declaring_type.as_str(), |(_, nested)| nested);
                if simple.starts_with(prefix) {
                    self.find_type(&ctor.declaring_type)
                } else {
                    None
                }
            })
    }
}

/// Iterator and async return types, compared without generic arguments.
const STATE_MACHINE_RETURN_TYPES: &[&str] = &[
    "System.Collections.IEnumerator",
    "System.Collections.IEnumerable",
    "System.Collections.Generic.IEnumerator",
    "System.Collections.Generic.IEnumerable",
    "System.Collections.Generic.IAsyncEnumerable",
    "System.Collections.Generic.IAsyncEnumerator",
    "System.Threading.Tasks.Task",
    "System.Threading.Tasks.ValueTask",
];

fn returns_state_machine(return_type: &str) -> bool {
    let open = return_type
        .split(|c| c == '<' || c == '`')
        .next()
        .unwrap_or(return_type);
    STATE_MACHINE_RETURN_TYPES.contains(&open)
}

fn split_member(qualified: &str) -> Result<(&str, &str)> {
    qualified
        .rsplit_once("::")
        .ok_or_else(|| Error::MemberNotFound(qualified.to_string()))
}

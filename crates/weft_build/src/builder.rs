//! The construction API handed to module construction functions.
//!
//! [`ModuleBuilder`] records everything a construction function declares into
//! the module's [`ModuleDef`]: expressions, channels created by
//! [`wrap`](ModuleBuilder::wrap), bundles created by
//! [`pack`](ModuleBuilder::pack) or [`request`](ModuleBuilder::request),
//! service instances, builtins, and sub-module instantiations. Every
//! structural contract is checked here, when the construct is declared.
//!
//! Channel and bundle handles are linear: they are not `Clone`, and every
//! operation that consumes one takes it by value. A channel therefore gets at
//! most one consumer:
//!
//! ```compile_fail
//! use weft_build::{BuildError, ModuleBuilder};
//! use weft_ir::Type;
//!
//! fn twice(b: &mut ModuleBuilder<'_, '_>) -> Result<(), BuildError> {
//!     let data = b.constant(&Type::Bits(8), 1)?;
//!     let valid = b.bool(true);
//!     let (ch, _ready) = b.wrap(&Type::Bits(8), data, valid)?;
//!     let ready = b.bool(true);
//!     b.unwrap(ch, ready)?;
//!     b.unwrap(ch, ready)?;
//!     Ok(())
//! }
//! ```

use crate::backend::Capabilities;
use crate::context::GenerationContext;
use crate::errors::BuildError;
use std::collections::HashSet;
use weft_config::BackendPreset;
use weft_ir::{
    AppId, BuiltinInstance, Bundle, BundleEnd, BundleId, BundleType, Channel, ChannelDirection,
    ChannelId, ChildInstance, Consumer, Expr, ModuleDef, Producer, RoleSlot, ServiceDecl,
    ServiceInstance, ServiceProvider, ServiceRole, Type, TypeId, Value,
};

/// A channel owned by the module that created it, waiting for a consumer.
#[derive(Debug)]
pub struct ChannelHandle {
    id: ChannelId,
    payload: TypeId,
    scope: u32,
}

impl ChannelHandle {
    /// Returns the channel's ID in the module definition.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Returns the interned payload type.
    pub fn payload(&self) -> TypeId {
        self.payload
    }
}

/// A bundle waiting for its missing end.
#[derive(Debug)]
pub struct BundleHandle {
    id: BundleId,
    ty: TypeId,
    scope: u32,
}

impl BundleHandle {
    /// Returns the bundle's ID in the module definition.
    pub fn id(&self) -> BundleId {
        self.id
    }

    /// Returns the interned bundle type.
    pub fn ty(&self) -> TypeId {
        self.ty
    }
}

/// Channels returned by `pack` or `unpack`, keyed by role.
#[derive(Debug)]
pub struct RoleChannels {
    module: String,
    channels: Vec<(String, ChannelHandle)>,
}

impl RoleChannels {
    /// Removes and returns the channel for `role`.
    pub fn take(&mut self, role: &str) -> Result<ChannelHandle, BuildError> {
        match self.channels.iter().position(|(name, _)| name == role) {
            Some(pos) => Ok(self.channels.remove(pos).1),
            None => Err(BuildError::MissingRole {
                module: self.module.clone(),
                role: role.to_string(),
            }),
        }
    }

    /// Returns the roles not taken yet.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the number of channels not taken yet.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if every channel has been taken.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Records the declarations of one module's construction function.
pub struct ModuleBuilder<'c, 'a> {
    ctx: &'c mut GenerationContext<'a>,
    def: ModuleDef,
    name: String,
    scope: u32,
    appids: HashSet<AppId>,
}

impl<'c, 'a> ModuleBuilder<'c, 'a> {
    pub(crate) fn new(
        ctx: &'c mut GenerationContext<'a>,
        def: ModuleDef,
        name: String,
        scope: u32,
    ) -> Self {
        Self {
            ctx,
            def,
            name,
            scope,
            appids: HashSet::new(),
        }
    }

    pub(crate) fn finish(self) -> ModuleDef {
        self.def
    }

    /// Returns the name of the module being constructed.
    pub fn module_name(&self) -> &str {
        &self.name
    }

    /// Returns what the selected backend can realize. Construction functions
    /// branch on this to avoid constructs the backend would reject.
    pub fn capabilities(&self) -> Capabilities {
        self.ctx.capabilities
    }

    /// Returns the selected backend preset.
    pub fn backend(&self) -> BackendPreset {
        self.ctx.backend
    }

    // ----- expressions -----

    /// Reads an input port by name.
    pub fn port(&mut self, name: &str) -> Result<Value, BuildError> {
        let index = self
            .ctx
            .interner
            .get(name)
            .and_then(|ident| self.def.port_index(ident))
            .ok_or_else(|| BuildError::UnknownPort {
                module: self.name.clone(),
                port: name.to_string(),
            })?;
        let ty = self.def.ports[index].ty;
        Ok(self.alloc_expr(Expr::Port(index as u32), ty))
    }

    /// Creates a constant of a bits type.
    pub fn constant(&mut self, ty: &Type, value: u64) -> Result<Value, BuildError> {
        let Type::Bits(width) = ty else {
            return Err(self.mismatch("constant", "bits", &ty.to_string()));
        };
        if *width < 64 && value >> width != 0 {
            return Err(BuildError::ConstantOutOfRange {
                module: self.name.clone(),
                value,
                ty: ty.to_string(),
            });
        }
        let id = self.ctx.types.intern(ty);
        Ok(self.alloc_expr(Expr::Const(value), id))
    }

    /// Creates a single-bit constant.
    pub fn bool(&mut self, value: bool) -> Value {
        let id = self.ctx.types.intern(&Type::bool());
        self.alloc_expr(Expr::Const(value as u64), id)
    }

    /// Builds a struct value. Every field of `ty` must be given exactly once.
    pub fn make_struct(&mut self, ty: &Type, fields: &[(&str, Value)]) -> Result<Value, BuildError> {
        let Type::Struct(decl) = ty else {
            return Err(self.mismatch("struct literal", "struct", &ty.to_string()));
        };
        let mut slots: Vec<Option<Value>> = vec![None; decl.len()];
        for (name, value) in fields {
            let Some((index, field_ty)) = ty.field(name) else {
                return Err(self.field_error(ty, name, "unknown"));
            };
            if slots[index].is_some() {
                return Err(self.field_error(ty, name, "given twice"));
            }
            let expected = self.ctx.types.intern(field_ty);
            self.expect_type(*value, expected, &format!("field '{name}'"))?;
            slots[index] = Some(*value);
        }
        let mut exprs = Vec::with_capacity(slots.len());
        for (slot, (name, _)) in slots.iter().zip(decl) {
            match slot {
                Some(value) => exprs.push(value.expr),
                None => return Err(self.field_error(ty, name, "missing")),
            }
        }
        let id = self.ctx.types.intern(ty);
        Ok(self.alloc_expr(Expr::Struct(exprs), id))
    }

    /// Extracts a struct field.
    pub fn field(&mut self, value: Value, name: &str) -> Result<Value, BuildError> {
        let ty = self.ctx.types.get(value.ty).clone();
        if !matches!(ty, Type::Struct(_)) {
            return Err(self.mismatch(&format!("field '{name}'"), "struct", &ty.to_string()));
        }
        let Some((index, field_ty)) = ty.field(name) else {
            return Err(self.field_error(&ty, name, "unknown"));
        };
        let field_id = self.ctx.types.intern(field_ty);
        Ok(self.alloc_expr(
            Expr::Field {
                base: value.expr,
                index: index as u32,
            },
            field_id,
        ))
    }

    /// Single-bit AND.
    pub fn and(&mut self, a: Value, b: Value) -> Result<Value, BuildError> {
        let bit = self.bool_type();
        self.expect_type(a, bit, "and")?;
        self.expect_type(b, bit, "and")?;
        Ok(self.alloc_expr(Expr::And(a.expr, b.expr), bit))
    }

    /// Single-bit OR.
    pub fn or(&mut self, a: Value, b: Value) -> Result<Value, BuildError> {
        let bit = self.bool_type();
        self.expect_type(a, bit, "or")?;
        self.expect_type(b, bit, "or")?;
        Ok(self.alloc_expr(Expr::Or(a.expr, b.expr), bit))
    }

    /// Single-bit NOT.
    pub fn not(&mut self, a: Value) -> Result<Value, BuildError> {
        let bit = self.bool_type();
        self.expect_type(a, bit, "not")?;
        Ok(self.alloc_expr(Expr::Not(a.expr), bit))
    }

    // ----- channels -----

    /// Creates a channel carrying `value` whenever `valid` holds.
    ///
    /// Returns the channel and its consumer's `ready`. Nothing is buffered:
    /// a cycle where `valid` is high and `ready` is low transfers nothing, so
    /// the producer must hold `value` and `valid` until it sees `ready`.
    pub fn wrap(
        &mut self,
        payload: &Type,
        value: Value,
        valid: Value,
    ) -> Result<(ChannelHandle, Value), BuildError> {
        if !payload.is_payload() {
            return Err(self.mismatch("channel payload", "bits or struct", &payload.to_string()));
        }
        let payload_id = self.ctx.types.intern(payload);
        self.expect_type(value, payload_id, "wrapped value")?;
        let bit = self.bool_type();
        self.expect_type(valid, bit, "valid")?;
        let id = self.def.channels.alloc(Channel {
            payload: payload_id,
            producer: Producer::Wrapped {
                data: value.expr,
                valid: valid.expr,
            },
            consumer: Consumer::Unbound,
        });
        let ready = self.alloc_expr(Expr::ChannelReady(id), bit);
        Ok((self.handle(id, payload_id), ready))
    }

    /// Consumes a channel, driving its `ready` with `ready`.
    ///
    /// Returns the payload and `valid`. The payload is only meaningful while
    /// `valid` is high.
    pub fn unwrap(
        &mut self,
        channel: ChannelHandle,
        ready: Value,
    ) -> Result<(Value, Value), BuildError> {
        self.check_scope(channel.scope, "channel")?;
        let bit = self.bool_type();
        self.expect_type(ready, bit, "ready")?;
        if !self
            .def
            .bind_consumer(channel.id, Consumer::Unwrapped { ready: ready.expr })
        {
            return Err(BuildError::ChannelRebound {
                module: self.name.clone(),
            });
        }
        let data = self.alloc_expr(Expr::ChannelData(channel.id), channel.payload);
        let valid = self.alloc_expr(Expr::ChannelValid(channel.id), bit);
        Ok((data, valid))
    }

    // ----- bundles -----

    /// Packs the client's request channels into a bundle.
    ///
    /// `channels` must supply every role flowing to the service, each once,
    /// with the declared payload. The returned [`RoleChannels`] hold the
    /// channels flowing back from the service.
    pub fn pack(
        &mut self,
        ty: &BundleType,
        channels: Vec<(&str, ChannelHandle)>,
    ) -> Result<(BundleHandle, RoleChannels), BuildError> {
        let roles = self.match_roles(ty, &channels, ChannelDirection::ToService)?;
        let bundle_ty = self.ctx.types.intern(&Type::Bundle(ty.clone()));
        let bundle = self.def.bundles.next_id();
        let mut slots = self.role_slots(ty);

        for ((_, channel), &role) in channels.iter().zip(&roles) {
            self.bind_to_bundle(channel, bundle, role)?;
            slots[role as usize].client = Some(channel.id);
        }
        let returned = self.open_roles(ty, bundle, ChannelDirection::FromService, &mut slots, true);

        self.def.bundles.alloc(Bundle {
            ty: bundle_ty,
            roles: slots,
            client: BundleEnd::Local,
            server: BundleEnd::Unbound,
        });
        Ok((
            BundleHandle {
                id: bundle,
                ty: bundle_ty,
                scope: self.scope,
            },
            returned,
        ))
    }

    /// Serves a bundle locally: the dual of [`pack`](Self::pack).
    ///
    /// `channels` must supply every role flowing from the service. The
    /// returned [`RoleChannels`] hold the client's request channels.
    pub fn unpack(
        &mut self,
        bundle: BundleHandle,
        channels: Vec<(&str, ChannelHandle)>,
    ) -> Result<RoleChannels, BuildError> {
        self.check_scope(bundle.scope, "bundle")?;
        if self.def.bundles[bundle.id].server.is_bound() {
            return Err(BuildError::BundleRebound {
                module: self.name.clone(),
                end: "server",
            });
        }
        let Type::Bundle(ty) = self.ctx.types.get(bundle.ty).clone() else {
            return Err(weft_common::InternalError::new("bundle handle without bundle type").into());
        };
        let roles = self.match_roles(&ty, &channels, ChannelDirection::FromService)?;

        let mut slots = std::mem::take(&mut self.def.bundles[bundle.id].roles);
        for ((_, channel), &role) in channels.iter().zip(&roles) {
            self.bind_to_bundle(channel, bundle.id, role)?;
            slots[role as usize].server = Some(channel.id);
        }
        let returned = self.open_roles(&ty, bundle.id, ChannelDirection::ToService, &mut slots, false);

        let entry = &mut self.def.bundles[bundle.id];
        entry.roles = slots;
        entry.server = BundleEnd::Local;
        Ok(returned)
    }

    // ----- services -----

    /// Registers `bundle` as serviced by operation `op` of `service`.
    pub fn call(
        &mut self,
        service: &ServiceDecl,
        op: &str,
        bundle: BundleHandle,
        appid: AppId,
    ) -> Result<(), BuildError> {
        self.check_scope(bundle.scope, "bundle")?;
        let service_index = self.service_index(service)?;
        let op_index = operation_index(service, op)?;
        self.check_host(service)?;
        if self.def.bundles[bundle.id].server.is_bound() {
            return Err(BuildError::BundleRebound {
                module: self.name.clone(),
                end: "server",
            });
        }
        let expected = self
            .ctx
            .types
            .intern(&Type::Bundle(service.operations()[op_index as usize].bundle.clone()));
        if expected != bundle.ty {
            return Err(BuildError::RoleTypeMismatch {
                module: self.name.clone(),
                what: format!("operation '{}.{op}'", service.name()),
                expected: self.type_name(expected),
                found: self.type_name(bundle.ty),
            });
        }
        self.claim_appid(&appid)?;
        tracing::debug!(module = %self.name, appid = %appid, service = service.name(), op, "service call");
        let sid = self.def.services.alloc(ServiceInstance {
            appid,
            service: service_index,
            operation: op_index,
            bundle: bundle.id,
            role: ServiceRole::Server,
        });
        self.def.bundles[bundle.id].server = BundleEnd::Service(sid);
        Ok(())
    }

    /// Obtains a bundle whose client is a host service: the host drives the
    /// request roles and receives the responses.
    pub fn request(
        &mut self,
        service: &ServiceDecl,
        op: &str,
        appid: AppId,
    ) -> Result<BundleHandle, BuildError> {
        let service_index = self.service_index(service)?;
        let op_index = operation_index(service, op)?;
        if service.provider() != ServiceProvider::Host {
            return Err(BuildError::InvalidServiceUse {
                module: self.name.clone(),
                service: service.name().to_string(),
                reason: "only host services originate bundles; use call".to_string(),
            });
        }
        self.check_host(service)?;
        self.claim_appid(&appid)?;

        let ty = service.operations()[op_index as usize].bundle.clone();
        let bundle_ty = self.ctx.types.intern(&Type::Bundle(ty.clone()));
        let slots = self.role_slots(&ty);
        let bundle = self.def.bundles.next_id();
        tracing::debug!(module = %self.name, appid = %appid, service = service.name(), op, "host request");
        let sid = self.def.services.alloc(ServiceInstance {
            appid,
            service: service_index,
            operation: op_index,
            bundle,
            role: ServiceRole::Client,
        });
        self.def.bundles.alloc(Bundle {
            ty: bundle_ty,
            roles: slots,
            client: BundleEnd::Service(sid),
            server: BundleEnd::Unbound,
        });
        Ok(BundleHandle {
            id: bundle,
            ty: bundle_ty,
            scope: self.scope,
        })
    }

    /// Places a service's concrete realization in this module, bypassing the
    /// call indirection. Returns one value per entry of `result_types`.
    pub fn instantiate_builtin(
        &mut self,
        service: &ServiceDecl,
        appid: AppId,
        builtin: &str,
        result_types: &[Type],
        inputs: &[Value],
    ) -> Result<Vec<Value>, BuildError> {
        let service_index = self.service_index(service)?;
        if service.provider() != ServiceProvider::Builtin {
            return Err(BuildError::InvalidServiceUse {
                module: self.name.clone(),
                service: service.name().to_string(),
                reason: "host services have no builtin realization".to_string(),
            });
        }
        if !self.ctx.capabilities.supports_builtin(builtin) {
            return Err(BuildError::UnsupportedBuiltin {
                backend: self.ctx.backend.to_string(),
                scope: self.name.clone(),
                tag: builtin.to_string(),
            });
        }
        self.claim_appid(&appid)?;

        let position = self.def.builtins.len() as u32;
        let results: Vec<TypeId> = result_types.iter().map(|t| self.ctx.types.intern(t)).collect();
        tracing::debug!(module = %self.name, appid = %appid, builtin, "builtin instance");
        self.def.builtins.push(BuiltinInstance {
            appid,
            service: service_index,
            tag: self.ctx.interner.get_or_intern(builtin),
            results: results.clone(),
            inputs: inputs.iter().map(|v| v.expr).collect(),
        });
        Ok(results
            .into_iter()
            .enumerate()
            .map(|(index, ty)| {
                self.alloc_expr(
                    Expr::BuiltinResult {
                        builtin: position,
                        index: index as u32,
                    },
                    ty,
                )
            })
            .collect())
    }

    // ----- hierarchy -----

    /// Instantiates a library module. Every port of the child must be
    /// connected exactly once with a value of the port's type.
    pub fn instantiate(
        &mut self,
        module: &str,
        appid: AppId,
        connections: &[(&str, Value)],
    ) -> Result<(), BuildError> {
        self.claim_appid(&appid)?;
        let child = self.ctx.elaborate_module(module)?;
        let ports = self.ctx.modules[child].ports.clone();

        for (name, _) in connections {
            let known = self
                .ctx
                .interner
                .get(name)
                .is_some_and(|ident| ports.iter().any(|p| p.name == ident));
            if !known {
                return Err(BuildError::UnknownPort {
                    module: module.to_string(),
                    port: name.to_string(),
                });
            }
        }

        let mut wired = Vec::with_capacity(ports.len());
        for port in &ports {
            let port_name = self.ctx.interner.resolve(port.name).to_string();
            let mut matching = connections.iter().filter(|(n, _)| *n == port_name);
            let Some((_, value)) = matching.next() else {
                return Err(self.connection_error(module, &port_name, "not connected"));
            };
            if matching.next().is_some() {
                return Err(self.connection_error(module, &port_name, "connected twice"));
            }
            if value.ty != port.ty {
                return Err(BuildError::PortTypeMismatch {
                    module: self.name.clone(),
                    child: module.to_string(),
                    port: port_name,
                    expected: self.type_name(port.ty),
                    found: self.type_name(value.ty),
                });
            }
            wired.push(value.expr);
        }

        tracing::debug!(module = %self.name, appid = %appid, child = module, "instantiate");
        self.def.children.push(ChildInstance {
            appid,
            module: child,
            connections: wired,
        });
        Ok(())
    }

    // ----- helpers -----

    fn alloc_expr(&mut self, expr: Expr, ty: TypeId) -> Value {
        Value::new(self.def.exprs.alloc(expr), ty)
    }

    fn handle(&self, id: ChannelId, payload: TypeId) -> ChannelHandle {
        ChannelHandle {
            id,
            payload,
            scope: self.scope,
        }
    }

    fn bool_type(&mut self) -> TypeId {
        self.ctx.types.intern(&Type::bool())
    }

    fn type_name(&self, id: TypeId) -> String {
        self.ctx.types.get(id).to_string()
    }

    fn mismatch(&self, context: &str, expected: &str, found: &str) -> BuildError {
        BuildError::TypeMismatch {
            module: self.name.clone(),
            context: context.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    fn field_error(&self, ty: &Type, field: &str, problem: &'static str) -> BuildError {
        BuildError::FieldMismatch {
            module: self.name.clone(),
            ty: ty.to_string(),
            field: field.to_string(),
            problem,
        }
    }

    fn connection_error(&self, child: &str, port: &str, problem: &'static str) -> BuildError {
        BuildError::PortConnection {
            module: self.name.clone(),
            child: child.to_string(),
            port: port.to_string(),
            problem,
        }
    }

    fn expect_type(&self, value: Value, expected: TypeId, context: &str) -> Result<(), BuildError> {
        if value.ty == expected {
            Ok(())
        } else {
            Err(self.mismatch(context, &self.type_name(expected), &self.type_name(value.ty)))
        }
    }

    fn check_scope(&self, scope: u32, what: &'static str) -> Result<(), BuildError> {
        if scope == self.scope {
            Ok(())
        } else {
            Err(BuildError::ForeignHandle {
                module: self.name.clone(),
                what,
            })
        }
    }

    fn claim_appid(&mut self, appid: &AppId) -> Result<(), BuildError> {
        if !appid.is_well_formed() {
            return Err(BuildError::InvalidAppId {
                module: self.name.clone(),
                appid: appid.to_string(),
            });
        }
        if !self.appids.insert(appid.clone()) {
            return Err(BuildError::DuplicateAppId {
                module: self.name.clone(),
                appid: appid.to_string(),
            });
        }
        Ok(())
    }

    fn service_index(&self, service: &ServiceDecl) -> Result<u32, BuildError> {
        match self.ctx.library.service(service.name()) {
            Some((index, registered)) if registered == service => Ok(index),
            Some(_) => Err(BuildError::InvalidServiceUse {
                module: self.name.clone(),
                service: service.name().to_string(),
                reason: "it differs from the declaration registered in the library".to_string(),
            }),
            None => Err(BuildError::UnknownService {
                name: service.name().to_string(),
            }),
        }
    }

    fn check_host(&self, service: &ServiceDecl) -> Result<(), BuildError> {
        if service.provider() == ServiceProvider::Host && !self.ctx.capabilities.host_channels {
            return Err(BuildError::HostChannelsUnsupported {
                backend: self.ctx.backend.to_string(),
                scope: self.name.clone(),
                service: service.name().to_string(),
            });
        }
        Ok(())
    }

    fn role_slots(&mut self, ty: &BundleType) -> Vec<RoleSlot> {
        ty.ports
            .iter()
            .map(|port| RoleSlot {
                name: self.ctx.interner.get_or_intern(&port.name),
                direction: port.direction,
                payload: self.ctx.types.intern(&port.payload),
                client: None,
                server: None,
            })
            .collect()
    }

    /// Checks supplied channels against the roles flowing in `direction`,
    /// returning each channel's role position.
    fn match_roles(
        &mut self,
        ty: &BundleType,
        channels: &[(&str, ChannelHandle)],
        direction: ChannelDirection,
    ) -> Result<Vec<u32>, BuildError> {
        let mut positions = Vec::with_capacity(channels.len());
        for (role, channel) in channels {
            self.check_scope(channel.scope, "channel")?;
            let Some((index, port)) = ty.port(role) else {
                return Err(BuildError::UnexpectedRole {
                    module: self.name.clone(),
                    role: role.to_string(),
                    reason: format!("not a role of {ty}"),
                });
            };
            if port.direction != direction {
                return Err(BuildError::UnexpectedRole {
                    module: self.name.clone(),
                    role: role.to_string(),
                    reason: match direction {
                        ChannelDirection::ToService => {
                            "it flows from the service and is returned by pack".to_string()
                        }
                        ChannelDirection::FromService => {
                            "it flows to the service and is returned by unpack".to_string()
                        }
                    },
                });
            }
            if positions.contains(&(index as u32)) {
                return Err(BuildError::DuplicateRole {
                    module: self.name.clone(),
                    role: role.to_string(),
                });
            }
            let expected = self.ctx.types.intern(&port.payload);
            if channel.payload != expected {
                return Err(BuildError::RoleTypeMismatch {
                    module: self.name.clone(),
                    what: format!("role '{role}'"),
                    expected: self.type_name(expected),
                    found: self.type_name(channel.payload),
                });
            }
            if self.def.channels[channel.id].consumer != Consumer::Unbound {
                return Err(BuildError::ChannelRebound {
                    module: self.name.clone(),
                });
            }
            positions.push(index as u32);
        }
        if let Some(missing) = ty
            .ports_in(direction)
            .find(|port| !channels.iter().any(|(role, _)| *role == port.name))
        {
            return Err(BuildError::MissingRole {
                module: self.name.clone(),
                role: missing.name.clone(),
            });
        }
        Ok(positions)
    }

    fn bind_to_bundle(
        &mut self,
        channel: &ChannelHandle,
        bundle: BundleId,
        role: u32,
    ) -> Result<(), BuildError> {
        if self
            .def
            .bind_consumer(channel.id, Consumer::Bundle { bundle, role })
        {
            Ok(())
        } else {
            Err(BuildError::ChannelRebound {
                module: self.name.clone(),
            })
        }
    }

    /// Creates the channels the bundle drives toward this module for every
    /// role flowing in `direction`.
    fn open_roles(
        &mut self,
        ty: &BundleType,
        bundle: BundleId,
        direction: ChannelDirection,
        slots: &mut [RoleSlot],
        client_end: bool,
    ) -> RoleChannels {
        let mut returned = Vec::new();
        for (index, port) in ty.ports.iter().enumerate() {
            if port.direction != direction {
                continue;
            }
            let payload = slots[index].payload;
            let id = self.def.channels.alloc(Channel {
                payload,
                producer: Producer::Bundle {
                    bundle,
                    role: index as u32,
                },
                consumer: Consumer::Unbound,
            });
            if client_end {
                slots[index].client = Some(id);
            } else {
                slots[index].server = Some(id);
            }
            returned.push((port.name.clone(), self.handle(id, payload)));
        }
        RoleChannels {
            module: self.name.clone(),
            channels: returned,
        }
    }
}

fn operation_index(service: &ServiceDecl, op: &str) -> Result<u32, BuildError> {
    service
        .operations()
        .iter()
        .position(|o| o.name == op)
        .map(|i| i as u32)
        .ok_or_else(|| BuildError::UnknownOperation {
            service: service.name().to_string(),
            operation: op.to_string(),
        })
}

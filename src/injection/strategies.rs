//! Built-in injection strategies.

use std::sync::Arc;

use crate::config::ApplicationConfig;
use crate::error::{CompositeError, CompositeResult, ResolutionError};
use crate::injection::{InjectionFunctionality, InjectionTime, ProvisionContext, ValidationContext};
use crate::model::FragmentKind;
use crate::resolve::Resolver;
use crate::runtime::{
    ConcernNext, InvocationInfo, ServiceReference, SideEffectResult, StateHandle, Structure,
};
use crate::types::{value, TypeKey, Value};

/// Supplies a [`Structure`] handle or the [`ApplicationConfig`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StructureInjection;

impl InjectionFunctionality for StructureInjection {
    fn possible(&self, ctx: &ValidationContext<'_>) -> Result<(), String> {
        let target = ctx.point().target();
        if target == TypeKey::of::<Structure>() || target == TypeKey::of::<ApplicationConfig>() {
            Ok(())
        } else {
            Err(format!("{target} is not a structure type"))
        }
    }

    fn provide(&self, ctx: &ProvisionContext<'_>) -> CompositeResult<Option<Value>> {
        if ctx.point().target() == TypeKey::of::<ApplicationConfig>() {
            return Ok(ctx.application_config().map(value));
        }
        Ok(Some(value(ctx.structure())))
    }
}

/// Supplies [`ServiceReference`]s to services visible from the owning module.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceInjection;

impl InjectionFunctionality for ServiceInjection {
    fn possible(&self, ctx: &ValidationContext<'_>) -> Result<(), String> {
        let point = ctx.point();
        if point.is_many() || point.is_optional() {
            return Ok(());
        }
        let found = Resolver::new(ctx.application())
            .find_services(ctx.composite().location(), point.target());
        if found.is_empty() {
            Err(format!("no service implementing {} is visible", point.target()))
        } else {
            Ok(())
        }
    }

    fn provide(&self, ctx: &ProvisionContext<'_>) -> CompositeResult<Option<Value>> {
        let owner = ctx.owner()?;
        let target = ctx.point().target();
        if ctx.point().is_many() {
            let services: Vec<ServiceReference> = owner.find_services(target);
            return Ok(Some(value(services)));
        }
        match owner.find_service(target) {
            Ok(service) => Ok(Some(value(service))),
            Err(CompositeError::Resolution(ResolutionError::NotFound { .. })) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Supplies a [`ThisRef`](crate::runtime::ThisRef) to the composite itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThisInjection;

impl InjectionFunctionality for ThisInjection {
    fn possible(&self, ctx: &ValidationContext<'_>) -> Result<(), String> {
        let target = ctx.point().target();
        if ctx.composite().implements(&[target]) {
            Ok(())
        } else {
            Err(format!(
                "{target} is not a public type of {}",
                ctx.composite().describe()
            ))
        }
    }

    fn provide(&self, ctx: &ProvisionContext<'_>) -> CompositeResult<Option<Value>> {
        Ok(Some(value(ctx.this())))
    }
}

/// Supplies values from the uses container chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct UsesInjection;

impl InjectionFunctionality for UsesInjection {
    fn possible(&self, _ctx: &ValidationContext<'_>) -> Result<(), String> {
        // Builder values are only known at instantiation.
        Ok(())
    }

    fn provide(&self, ctx: &ProvisionContext<'_>) -> CompositeResult<Option<Value>> {
        let point = ctx.point();
        let id = point.target().id();
        Ok(match point.qualifier() {
            Some(name) => ctx.uses().find_named(name, id),
            None => ctx.uses().find_by_type(id),
        })
    }
}

/// Supplies the composite's [`StateHandle`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StateInjection;

impl InjectionFunctionality for StateInjection {
    fn possible(&self, ctx: &ValidationContext<'_>) -> Result<(), String> {
        expect_target::<StateHandle>(ctx)
    }

    fn provide(&self, ctx: &ProvisionContext<'_>) -> CompositeResult<Option<Value>> {
        Ok(Some(value(StateHandle::new(Arc::clone(&ctx.composite.state)))))
    }
}

/// Supplies the [`ConcernNext`] handle of the current call.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcernForInjection;

impl InjectionFunctionality for ConcernForInjection {
    fn timing(&self) -> InjectionTime {
        InjectionTime::OnMethodInvocation
    }

    fn possible(&self, ctx: &ValidationContext<'_>) -> Result<(), String> {
        if ctx.fragment().declared_as() != FragmentKind::Concern {
            return Err("only concerns can be injected with the next link of the chain".to_string());
        }
        expect_target::<ConcernNext>(ctx)
    }

    fn provide(&self, ctx: &ProvisionContext<'_>) -> CompositeResult<Option<Value>> {
        Ok(ctx.call.map(|call| {
            value(ConcernNext::new(
                Arc::downgrade(ctx.composite),
                call.method,
                call.position + 1,
            ))
        }))
    }
}

/// Supplies the [`SideEffectResult`] of the completed call.
#[derive(Debug, Default, Clone, Copy)]
pub struct SideEffectForInjection;

impl InjectionFunctionality for SideEffectForInjection {
    fn timing(&self) -> InjectionTime {
        InjectionTime::OnMethodInvocation
    }

    fn possible(&self, ctx: &ValidationContext<'_>) -> Result<(), String> {
        if ctx.fragment().declared_as() != FragmentKind::SideEffect {
            return Err("only side-effects can observe call results".to_string());
        }
        expect_target::<SideEffectResult>(ctx)
    }

    fn provide(&self, ctx: &ProvisionContext<'_>) -> CompositeResult<Option<Value>> {
        Ok(ctx
            .call
            .and_then(|call| call.result.as_ref())
            .map(|result| Arc::clone(result) as Value))
    }
}

/// Supplies the [`InvocationInfo`] of the current call.
#[derive(Debug, Default, Clone, Copy)]
pub struct InvocationInjection;

impl InjectionFunctionality for InvocationInjection {
    fn timing(&self) -> InjectionTime {
        InjectionTime::OnMethodInvocation
    }

    fn possible(&self, ctx: &ValidationContext<'_>) -> Result<(), String> {
        expect_target::<InvocationInfo>(ctx)
    }

    fn provide(&self, ctx: &ProvisionContext<'_>) -> CompositeResult<Option<Value>> {
        Ok(ctx.invocation().map(|info| Arc::clone(info) as Value))
    }
}

fn expect_target<T: 'static>(ctx: &ValidationContext<'_>) -> Result<(), String> {
    let expected = TypeKey::of::<T>();
    let target = ctx.point().target();
    if target == expected {
        Ok(())
    } else {
        Err(format!("expected {expected}, found {target}"))
    }
}

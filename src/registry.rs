//! Template registry.
//!
//! The registry maps each template id to exactly one [`TemplateContract`] and,
//! optionally, a [`PropResolver`] that enriches card properties for that
//! template. It is built once at configuration time and read-only afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::card::{Card, Props};
use crate::content::SeedPackSet;
use crate::context::UserSnapshot;
use crate::contract::{TemplateContract, ValidationReport};
use crate::error::ContractError;
use crate::session::SessionState;

/// Everything a resolver may read while enriching one card.
#[derive(Debug, Clone, Copy)]
pub struct ResolveScope<'a> {
    /// The card being resolved (seed item, variant, iteration).
    pub card: &'a Card,
    /// Session state at the time of resolution.
    pub session: &'a SessionState,
    /// Learner snapshot.
    pub user: &'a UserSnapshot,
    /// All loaded seed packs for the module.
    pub packs: &'a SeedPackSet,
}

/// Per-template property enrichment.
///
/// Resolvers run after static properties and seed fields are applied. They
/// must only fill properties that are still absent.
pub trait PropResolver: Send + Sync {
    /// Fills absent entries of `props`.
    fn resolve(&self, props: &mut Props, scope: &ResolveScope<'_>);
}

impl<F> PropResolver for F
where
    F: Fn(&mut Props, &ResolveScope<'_>) + Send + Sync,
{
    fn resolve(&self, props: &mut Props, scope: &ResolveScope<'_>) {
        self(props, scope);
    }
}

struct RegisteredTemplate {
    contract: TemplateContract,
    resolver: Option<Arc<dyn PropResolver>>,
}

/// Registry holding template contracts for lesson cards.
#[derive(Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, RegisteredTemplate>,
}

impl TemplateRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a contract without a resolver.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::DuplicateTemplate` if the id is taken.
    pub fn register(&mut self, contract: TemplateContract) -> Result<(), ContractError> {
        self.insert(contract, None)
    }

    /// Registers a contract together with its property resolver.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::DuplicateTemplate` if the id is taken.
    pub fn register_with_resolver<R>(
        &mut self,
        contract: TemplateContract,
        resolver: R,
    ) -> Result<(), ContractError>
    where
        R: PropResolver + 'static,
    {
        self.insert(contract, Some(Arc::new(resolver)))
    }

    /// Registers several contracts, stopping at the first duplicate.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::DuplicateTemplate` on the first taken id.
    pub fn register_many<I>(&mut self, contracts: I) -> Result<(), ContractError>
    where
        I: IntoIterator<Item = TemplateContract>,
    {
        for contract in contracts {
            self.register(contract)?;
        }
        Ok(())
    }

    fn insert(
        &mut self,
        contract: TemplateContract,
        resolver: Option<Arc<dyn PropResolver>>,
    ) -> Result<(), ContractError> {
        let template_id = contract.template_id().to_string();
        if self.templates.contains_key(&template_id) {
            return Err(ContractError::DuplicateTemplate { template_id });
        }
        self.templates
            .insert(template_id, RegisteredTemplate { contract, resolver });
        Ok(())
    }

    /// Looks up the contract for `template_id`.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::UnknownTemplate` if nothing is registered.
    pub fn get(&self, template_id: &str) -> Result<&TemplateContract, ContractError> {
        self.templates
            .get(template_id)
            .map(|t| &t.contract)
            .ok_or_else(|| ContractError::UnknownTemplate {
                template_id: template_id.to_string(),
            })
    }

    /// The resolver registered for `template_id`, if any.
    #[must_use]
    pub fn resolver(&self, template_id: &str) -> Option<&dyn PropResolver> {
        self.templates
            .get(template_id)
            .and_then(|t| t.resolver.as_deref())
    }

    #[must_use]
    pub fn contains(&self, template_id: &str) -> bool {
        self.templates.contains_key(template_id)
    }

    /// Registered template ids in sorted order.
    pub fn template_ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Validates `props` against the contract for `template_id`.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::UnknownTemplate` if nothing is registered.
    pub fn validate(
        &self,
        template_id: &str,
        props: &Props,
    ) -> Result<ValidationReport, ContractError> {
        Ok(self.get(template_id)?.validate(props))
    }

    /// Validates and fails outright on any broken rule.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::UnknownTemplate` or `ContractError::Invalid`.
    pub fn ensure(&self, template_id: &str, props: &Props) -> Result<(), ContractError> {
        self.get(template_id)?.ensure(props)
    }
}

impl fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for (id, t) in &self.templates {
            list.entry(&format_args!(
                "{id} ({}{})",
                t.contract.scoring_mode(),
                if t.resolver.is_some() { ", resolver" } else { "" }
            ));
        }
        list.finish()
    }
}

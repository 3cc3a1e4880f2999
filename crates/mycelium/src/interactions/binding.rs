//! Handler prototypes and their request-type bindings.

use super::{HandlerError, InteractionError, RequestEvent};

/// Handler method bound to a request type.
pub type HandlerFn<I> = fn(&mut I, &RequestEvent) -> Result<(), HandlerError>;

/// A handler prototype.
///
/// The registry keeps one prototype per request type and calls
/// [`spawn`](Self::spawn) for every matching event, so each invocation works on
/// its own instance and nothing leaks between concurrent requests.
///
/// ```
/// use mycelium::interactions::{Bindings, HandlerError, Interaction, RequestEvent};
///
/// #[derive(Default)]
/// struct Echo {
///     seen: usize,
/// }
///
/// impl Echo {
///     fn echo(&mut self, event: &RequestEvent) -> Result<(), HandlerError> {
///         self.seen += 1;
///         event.respond(event.request().clone())?;
///         Ok(())
///     }
/// }
///
/// impl Interaction for Echo {
///     fn spawn(&self) -> Self {
///         Self::default()
///     }
///
///     fn bind(bindings: &mut Bindings<Self>) {
///         bindings.handles("Echo", Self::echo);
///     }
/// }
/// ```
pub trait Interaction: Send + Sync + Sized + 'static {
    /// Produces a fresh instance to handle one event.
    fn spawn(&self) -> Self;

    /// Declares which method handles which request type.
    fn bind(bindings: &mut Bindings<Self>);
}

/// Request-type to method table declared by an [`Interaction`].
pub struct Bindings<I> {
    entries: Vec<(String, HandlerFn<I>)>,
}

impl<I> Bindings<I> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Binds `handler` to `request_type`.
    pub fn handles(&mut self, request_type: impl Into<String>, handler: HandlerFn<I>) -> &mut Self {
        self.entries.push((request_type.into(), handler));
        self
    }
}

impl<I: Interaction> Bindings<I> {
    /// Collects the bindings of `I` and picks the method for `request_type`.
    pub(crate) fn resolve(request_type: &str) -> Result<HandlerFn<I>, InteractionError> {
        let mut bindings = Self::new();
        I::bind(&mut bindings);
        bindings.ensure_unique()?;
        bindings
            .entries
            .into_iter()
            .find(|(key, _)| key == request_type)
            .map(|(_, handler)| handler)
            .ok_or_else(|| InteractionError::UnboundRequestType {
                interaction: std::any::type_name::<I>(),
                request_type: request_type.to_string(),
            })
    }

    fn ensure_unique(&self) -> Result<(), InteractionError> {
        let mut seen = std::collections::HashSet::new();
        for (key, _) in &self.entries {
            if !seen.insert(key.as_str()) {
                return Err(InteractionError::DuplicateHandlerBinding {
                    interaction: std::any::type_name::<I>(),
                    request_type: key.clone(),
                });
            }
        }
        Ok(())
    }
}

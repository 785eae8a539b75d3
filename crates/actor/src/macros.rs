/// Declares an actor: a private state struct plus a cloneable wrapper type
/// that owns the [`Actor`](crate::Actor) handle.
///
/// ```ignore
/// define_actor! {
///     /// A counter.
///     pub struct Counter;
///
///     #[derive(Default)]
///     struct CounterState {
///         value: u32,
///     }
/// }
/// ```
///
/// The wrapper gets private `spawn(state, label)` and `handle()` methods;
/// add public methods in your own `impl` blocks.
#[macro_export]
macro_rules! define_actor {
    {
        $(#[$wrapper_attr:meta])*
        $v:vis struct $wrapper:ident;

        $(#[$state_attr:meta])*
        struct $state:ident {
            $($fields:tt)*
        }
    } => {
        $(#[$state_attr])*
        struct $state {
            $($fields)*
        }

        $(#[$wrapper_attr])*
        $v struct $wrapper {
            handle: $crate::Actor<$state>,
        }

        impl $wrapper {
            #[inline]
            #[allow(dead_code)]
            fn spawn(state: $state, label: Option<&str>) -> Self {
                Self {
                    handle: $crate::Actor::spawn(state, label),
                }
            }

            #[inline]
            #[allow(dead_code)]
            fn handle(&self) -> &$crate::Actor<$state> {
                &self.handle
            }
        }

        impl Clone for $wrapper {
            #[inline]
            fn clone(&self) -> Self {
                Self {
                    handle: self.handle.clone(),
                }
            }
        }
    };
}

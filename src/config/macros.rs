/// Declare a config section with its defaults in one place
///
/// ```ignore
/// config_struct! {
///     pub struct BroadcastConfig {
///         replay_window_secs: u64 = 300,
///         session_queue_capacity: usize = 64,
///     }
/// }
/// ```
///
/// Expands to a struct with public fields, a `Default` impl built from the
/// listed values, and serde support with `#[serde(default)]` so partial TOML
/// sections fall back field by field.
#[macro_export]
macro_rules! config_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_name:ident: $field_type:ty = $default_value:expr
            ),*
            $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
        #[serde(default)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field_name: $field_type,
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $(
                        $field_name: $default_value,
                    )*
                }
            }
        }
    };
}

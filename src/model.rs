/// Expand a model declaration into its storage-backed form: a wrapper over
/// an [`ObjectProxy`](crate::object::ObjectProxy) whose accessors delegate
/// every read and write to the field accessor layer, plus the schema
/// descriptor registration consults. This is the transformation step: the
/// declaration reads like a plain data class, the expansion binds it to live
/// storage.
///
/// Each field declares its getter and setter name, its Rust type, and
/// optional `[primary_key]` / `[indexed]` flags. `Option<..>` marks a field
/// nullable; object references are declared as `Option<Link<Target>>` and
/// lists of references as `Vec<Link<Target>>`.
///
/// ```
/// use realm_live::{Link, realm_object};
///
/// realm_object!(Person =>
///     name set_name: String [indexed],
///     age set_age: i64,
///     email set_email: Option<String>,
///     manager set_manager: Option<Link<Person>>,
/// );
/// ```
#[macro_export]
macro_rules! realm_object {
    (
        $(#[$meta:meta])*
        $name:ident => $($field:ident $setter:ident : $ty:ty $([$($flag:ident),+ $(,)?])?),+ $(,)?
    ) => {
        $(#[$meta])*
        pub struct $name {
            proxy: $crate::object::ObjectProxy,
        }

        impl $crate::object::RealmObject for $name {
            const TYPE_NAME: &'static str = stringify!($name);

            fn object_schema() -> $crate::schema::SchemaDescriptor {
                $crate::schema::SchemaDescriptor::new(Self::TYPE_NAME)
                    $(.field($crate::realm_object!(@spec $field : $ty $([$($flag),+])?)))+
            }

            fn from_proxy(proxy: $crate::object::ObjectProxy) -> Self {
                Self { proxy }
            }

            fn proxy(&self) -> &$crate::object::ObjectProxy {
                &self.proxy
            }
        }

        impl $name {
            $(
                pub fn $field(&self) -> $crate::error::AccessResult<$ty> {
                    self.proxy.get_typed(stringify!($field))
                }

                pub fn $setter(&self, value: $ty) -> $crate::error::AccessResult<()> {
                    self.proxy.set_typed(stringify!($field), value)
                }
            )+

            /// Whether the underlying row still exists.
            pub fn is_valid(&self) -> bool {
                self.proxy.is_valid()
            }

            /// Disconnected snapshot of the current field values.
            pub fn detach(&self) -> $crate::error::AccessResult<$crate::object::DetachedObject> {
                self.proxy.detach()
            }
        }

        impl ::std::cmp::PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.proxy == other.proxy
            }
        }

        impl ::std::cmp::Eq for $name {}

        impl ::std::hash::Hash for $name {
            fn hash<H: ::std::hash::Hasher>(&self, state: &mut H) {
                ::std::hash::Hash::hash(&self.proxy, state);
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("proxy", &self.proxy)
                    .finish()
            }
        }
    };

    (@spec $field:ident : $ty:ty) => {
        $crate::schema::FieldSpec::of::<$ty>(stringify!($field))
    };
    (@spec $field:ident : $ty:ty [$($flag:ident),+]) => {
        $crate::schema::FieldSpec::of::<$ty>(stringify!($field))$(.$flag())+
    };
}

//! Conversions between typed tuples and call argument lists.

use crate::domain::error::{RpcError, RpcResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Tuples that can be turned into an argument list.
pub trait IntoArgs {
    fn into_args(self) -> RpcResult<Vec<Value>>;
}

/// Tuples that can be read from an argument list.
pub trait FromArgs: Sized {
    fn from_args(args: Vec<Value>) -> RpcResult<Self>;
}

/// Convert a tuple of serializable values into an argument list.
pub fn to_args<A: IntoArgs>(args: A) -> RpcResult<Vec<Value>> {
    args.into_args()
}

/// Read a tuple of typed values from an argument list.
///
/// The list must have exactly as many entries as the tuple.
pub fn from_args<A: FromArgs>(args: Vec<Value>) -> RpcResult<A> {
    A::from_args(args)
}

impl IntoArgs for Vec<Value> {
    fn into_args(self) -> RpcResult<Vec<Value>> {
        Ok(self)
    }
}

impl IntoArgs for () {
    fn into_args(self) -> RpcResult<Vec<Value>> {
        Ok(Vec::new())
    }
}

impl FromArgs for () {
    fn from_args(args: Vec<Value>) -> RpcResult<Self> {
        expect_len(&args, 0)
    }
}

fn expect_len(args: &[Value], len: usize) -> RpcResult<()> {
    if args.len() == len {
        Ok(())
    } else {
        Err(RpcError::Codec(format!(
            "expected {len} arguments, got {}",
            args.len()
        )))
    }
}

macro_rules! tuple_args {
    ($len:literal => $($name:ident),+) => {
        impl<$($name: Serialize),+> IntoArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_args(self) -> RpcResult<Vec<Value>> {
                let ($($name,)+) = self;
                Ok(vec![$(serde_json::to_value($name)?),+])
            }
        }

        impl<$($name: DeserializeOwned),+> FromArgs for ($($name,)+) {
            fn from_args(args: Vec<Value>) -> RpcResult<Self> {
                expect_len(&args, $len)?;
                let mut args = args.into_iter();
                Ok(($(
                    serde_json::from_value::<$name>(args.next().unwrap_or(Value::Null))?,
                )+))
            }
        }
    };
}

tuple_args!(1 => A);
tuple_args!(2 => A, B);
tuple_args!(3 => A, B, C);
tuple_args!(4 => A, B, C, D);
tuple_args!(5 => A, B, C, D, E);
tuple_args!(6 => A, B, C, D, E, F);

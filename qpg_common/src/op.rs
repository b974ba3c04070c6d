/// Forwards `std::ops` operators on a single-field newtype to the wrapped value.
///
/// ```ignore
/// op!(Money: Add::add, Sub::sub);
/// op!(Money: assign AddAssign::add_assign, SubAssign::sub_assign);
/// op!(Money: neg);
/// ```
#[macro_export]
macro_rules! op {
    ($newtype:ident: neg) => {
        impl ::std::ops::Neg for $newtype {
            type Output = Self;

            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }
    };

    ($newtype:ident: assign $($op:ident :: $method:ident),+ $(,)?) => {
        $(
            impl ::std::ops::$op for $newtype {
                fn $method(&mut self, rhs: Self) {
                    ::std::ops::$op::$method(&mut self.0, rhs.0)
                }
            }
        )+
    };

    ($newtype:ident: $($op:ident :: $method:ident),+ $(,)?) => {
        $(
            impl ::std::ops::$op for $newtype {
                type Output = Self;

                fn $method(self, rhs: Self) -> Self::Output {
                    Self(::std::ops::$op::$method(self.0, rhs.0))
                }
            }
        )+
    };
}

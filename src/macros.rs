/// implement a `(busy, updated)` style trait for tuples whose members all implement it
///
/// `$id1` is the trait, `$id2` the update method and `$id3` the associated status type
macro_rules! impl_for_tuples_with_type {
    ($id1:ident;$id2:ident;$id3:ident;($($i:ident),+$(,)?)$(,)?) => {
        impl_for_one_tuple_with_type!($id1;$id2;$id3;($($i,)*));

    };
    ($id1:ident;$id2:ident;$id3:ident;($($i:ident),+$(,)?),$(($($else:ident),+$(,)?)),*$(,)?) => {
        impl_for_one_tuple_with_type!($id1;$id2;$id3;($($i,)*));
        impl_for_tuples_with_type!($id1;$id2;$id3;$(($($else,)*),)*);
    };
}
macro_rules! impl_for_one_tuple_with_type {
    ($id1:ident;$id2:ident;$id3:ident;($($i:ident),+$(,)?)) => {
        #[allow(non_snake_case)]
        impl<TypeOfTrait,$($i:$id1<$id3=TypeOfTrait>,)*> $id1 for ($($i,)*) {
            type $id3 = TypeOfTrait;
            fn $id2(&mut self,status:&mut Self::$id3,cycle:usize) -> (bool,bool) {
                let mut busy=false;
                let mut updated=false;
                let ( $(ref mut $i,)*) = *self;
                $(
                    let (tbusy,tupdated) = $i.$id2(status,cycle);
                    busy = busy || tbusy;
                    updated = updated || tupdated;
                )*
                (busy,updated)
            }
        }
    };
}

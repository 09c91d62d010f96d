macro_rules! trait_alias {
    (pub trait $name:ident = $($traits:tt)+) => {
        pub trait $name: $($traits)* {}
        impl<T: $($traits)*> $name for T {}
    };
}

pub(crate) use trait_alias;

pub fn sign_extend(data: u32, bits: u32) -> u32 {
    let sft = 32 - bits;
    (((data << sft) as i32) >> sft) as u32
}

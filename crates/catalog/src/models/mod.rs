mod object;

pub(crate) use self::object::ObjectRow;

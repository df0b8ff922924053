use crate::message::{AllReduceMessage, BaseMsg};

/// Host-provided delivery of all-reduce messages to tree neighbors. The all-reduce state
/// machine never touches a network socket directly; it calls back into whatever the owning job
/// uses to reach other workers.
pub trait AllReduceTransport<T>: Send + Sync {
    fn send_to_parent(&self, base_msg: BaseMsg, message: AllReduceMessage<T>);
    fn send_to_left_child(&self, base_msg: BaseMsg, message: AllReduceMessage<T>);
    fn send_to_right_child(&self, base_msg: BaseMsg, message: AllReduceMessage<T>);
}

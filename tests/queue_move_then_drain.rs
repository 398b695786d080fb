// Move-then-drain (spec §8): after a queue is moved, the new owner drains
// exactly what the old one held, in the same order, through nothing but the
// public `ferrite::queue` surface.

use std::ptr::NonNull;

use ferrite::queue::{Queue, Spsc, SpscHook, Stack, StackHook};

struct Node {
    spsc: SpscHook<Node>,
    stack: StackHook<Node>,
    value: u32,
}

fn spsc_hook(n: &Node) -> &SpscHook<Node> {
    &n.spsc
}

fn stack_hook(n: &Node) -> &StackHook<Node> {
    &n.stack
}

#[test]
fn spsc_move_then_drain_preserves_order() {
    let q = Spsc::<Node>::new(spsc_hook);
    let mut nodes: Vec<Box<Node>> = (0..5)
        .map(|i| {
            Box::new(Node {
                spsc: SpscHook::new(),
                stack: StackHook::new(),
                value: i,
            })
        })
        .collect();
    for n in &mut nodes {
        unsafe { q.push(NonNull::from(n.as_mut())) };
    }

    let moved = q;
    let mut drained = Vec::new();
    while let Some(n) = unsafe { moved.try_pop() } {
        drained.push(unsafe { n.as_ref() }.value);
    }
    assert_eq!(drained, (0..5).collect::<Vec<_>>());
    assert!(unsafe { moved.try_pop() }.is_none());
}

#[test]
fn stack_move_then_drain_preserves_lifo_order() {
    let q = Stack::<Node>::new(stack_hook);
    let mut nodes: Vec<Box<Node>> = (0..5)
        .map(|i| {
            Box::new(Node {
                spsc: SpscHook::new(),
                stack: StackHook::new(),
                value: i,
            })
        })
        .collect();
    for n in &mut nodes {
        unsafe { q.push(NonNull::from(n.as_mut())) };
    }

    let moved = q;
    let mut drained = Vec::new();
    while let Some(n) = unsafe { moved.try_pop() } {
        drained.push(unsafe { n.as_ref() }.value);
    }
    assert_eq!(drained, (0..5).rev().collect::<Vec<_>>());
    assert!(unsafe { moved.try_pop() }.is_none());
}

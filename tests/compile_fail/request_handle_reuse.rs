// Rationale: fetch consumes the in-flight handle, so it cannot be polled again.
use people_counter::{InferenceSession, StubBackend};

fn main() {
    let mut session =
        InferenceSession::new(Box::new(StubBackend::scripted(&[1, 3, 4, 4], vec![])));
    let handle = session.submit(ndarray::Array4::zeros((1, 3, 4, 4))).unwrap();
    let _output = session.fetch(handle);
    session.poll(&handle, None).unwrap();
}

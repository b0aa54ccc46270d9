// Rationale: a request handle is single-use proof of one in-flight request.
use people_counter::{InferenceSession, RequestHandle, StubBackend};

fn main() {
    let mut session =
        InferenceSession::new(Box::new(StubBackend::scripted(&[1, 3, 4, 4], vec![])));
    let handle = session.submit(ndarray::Array4::zeros((1, 3, 4, 4))).unwrap();
    let _second: RequestHandle = handle.clone();
}
